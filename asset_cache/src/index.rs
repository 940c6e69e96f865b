use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use compat_quake::bsp_q3::Bsp;

use crate::cache::{ShaderRecord, ShaderRegistry};
use crate::error::IngestError;
use crate::route::{strip_extension, AssetKind};

/// A cached image read back from disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub ext: String,
    pub data: Vec<u8>,
}

/// Logical name to cached artifact, per asset kind. Filled during a pass
/// and queryable only once the pass has completed.
#[derive(Debug, Default)]
pub struct AssetIndex {
    maps: BTreeMap<String, PathBuf>,
    textures: BTreeMap<String, PathBuf>,
    levelshots: BTreeMap<String, PathBuf>,
    shaders: ShaderRegistry,
    ready: bool,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn reset(&mut self) {
        self.maps.clear();
        self.textures.clear();
        self.levelshots.clear();
        self.shaders.clear();
        self.ready = false;
    }

    pub(crate) fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub(crate) fn insert(&mut self, kind: AssetKind, name: String, target: PathBuf) {
        let table = match kind {
            AssetKind::Map => &mut self.maps,
            AssetKind::Texture => &mut self.textures,
            AssetKind::Levelshot => &mut self.levelshots,
            // Shader scripts go through `shaders_mut`.
            AssetKind::Shader => return,
        };
        table.insert(name, target);
    }

    pub(crate) fn shaders_mut(&mut self) -> &mut ShaderRegistry {
        &mut self.shaders
    }

    pub(crate) fn shader_registry(&self) -> &ShaderRegistry {
        &self.shaders
    }

    /// Number of entries indexed for `kind`, regardless of readiness.
    pub fn count(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Map => self.maps.len(),
            AssetKind::Texture => self.textures.len(),
            AssetKind::Levelshot => self.levelshots.len(),
            AssetKind::Shader => self.shaders.len(),
        }
    }

    /// Sorted logical names for `kind`.
    pub fn names(&self, kind: AssetKind) -> Result<Vec<String>, IngestError> {
        self.check_ready()?;
        let names = match kind {
            AssetKind::Map => self.maps.keys().cloned().collect(),
            AssetKind::Texture => self.textures.keys().cloned().collect(),
            AssetKind::Levelshot => self.levelshots.keys().cloned().collect(),
            AssetKind::Shader => self.shaders.names().map(str::to_string).collect(),
        };
        Ok(names)
    }

    pub fn map_names(&self) -> Result<Vec<String>, IngestError> {
        self.names(AssetKind::Map)
    }

    pub fn texture_names(&self) -> Result<Vec<String>, IngestError> {
        self.names(AssetKind::Texture)
    }

    pub fn levelshot_names(&self) -> Result<Vec<String>, IngestError> {
        self.names(AssetKind::Levelshot)
    }

    pub fn map_file(&self, name: &str) -> Result<&Path, IngestError> {
        self.check_ready()?;
        lookup(&self.maps, AssetKind::Map, name)
    }

    /// Reads the cached map document back.
    pub fn map(&self, name: &str) -> Result<Bsp, IngestError> {
        let path = self.map_file(name)?;
        let json = read_cached(path, AssetKind::Map, name)?;
        serde_json::from_slice(&json)
            .map_err(|err| IngestError::format(path.display().to_string(), err))
    }

    /// Looks a texture up by path; any extension on `path` is ignored.
    pub fn texture_file(&self, path: &str) -> Result<&Path, IngestError> {
        self.check_ready()?;
        lookup(&self.textures, AssetKind::Texture, strip_extension(path))
    }

    pub fn levelshot_file(&self, name: &str) -> Result<&Path, IngestError> {
        self.check_ready()?;
        lookup(&self.levelshots, AssetKind::Levelshot, name)
    }

    pub fn levelshot(&self, name: &str) -> Result<Image, IngestError> {
        let path = self.levelshot_file(name)?;
        let data = read_cached(path, AssetKind::Levelshot, name)?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Image { ext, data })
    }

    pub fn shader(&self, name: &str) -> Result<&ShaderRecord, IngestError> {
        self.check_ready()?;
        self.shaders
            .get(name)
            .ok_or_else(|| IngestError::not_found(AssetKind::Shader, name))
    }

    /// Every shader definition, sorted by name.
    pub fn shaders(&self) -> Result<Vec<&ShaderRecord>, IngestError> {
        self.check_ready()?;
        Ok(self.shaders.records().collect())
    }

    fn check_ready(&self) -> Result<(), IngestError> {
        if self.ready {
            Ok(())
        } else {
            Err(IngestError::Usage(
                "asset index queried before ingestion completed".to_string(),
            ))
        }
    }
}

fn lookup<'a>(
    table: &'a BTreeMap<String, PathBuf>,
    kind: AssetKind,
    name: &str,
) -> Result<&'a Path, IngestError> {
    table
        .get(name)
        .map(PathBuf::as_path)
        .ok_or_else(|| IngestError::not_found(kind, name))
}

fn read_cached(path: &Path, kind: AssetKind, name: &str) -> Result<Vec<u8>, IngestError> {
    fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => IngestError::not_found(kind, name),
        _ => IngestError::io(path, err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use compat_quake::shader::Shader;

    fn ready_index(dir: &Path) -> AssetIndex {
        let mut index = AssetIndex::new();
        fs::write(dir.join("shot.png"), b"png-bytes").unwrap();
        index.insert(AssetKind::Levelshot, "dm1".to_string(), dir.join("shot.png"));
        index.insert(AssetKind::Levelshot, "gone".to_string(), dir.join("gone.jpg"));
        index.insert(
            AssetKind::Texture,
            "textures/a/b".to_string(),
            dir.join("textures/a/b.png"),
        );
        index.insert(AssetKind::Map, "zeta".to_string(), dir.join("maps/zeta.json"));
        index.insert(AssetKind::Map, "alpha".to_string(), dir.join("maps/alpha.json"));
        index.shaders_mut().insert(ShaderRecord {
            shader: Shader {
                name: "textures/a/b".to_string(),
                directives: Vec::new(),
                stages: Vec::new(),
            },
            package: "a.pk3".to_string(),
            path: "scripts/a.shader".to_string(),
        });
        index.mark_ready();
        index
    }

    #[test]
    fn queries_before_ready_are_usage_errors() {
        let index = AssetIndex::new();
        assert!(!index.is_ready());
        assert_eq!(index.map_names().unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(index.map("a").unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(index.texture_file("a").unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(index.levelshot("a").unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(index.shader("a").unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(index.shaders().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn names_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let index = ready_index(dir.path());
        assert_eq!(index.map_names().unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(index.names(AssetKind::Shader).unwrap(), vec!["textures/a/b"]);
        assert_eq!(index.count(AssetKind::Levelshot), 2);
    }

    #[test]
    fn texture_lookup_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let index = ready_index(dir.path());
        let expected = dir.path().join("textures/a/b.png");
        assert_eq!(index.texture_file("textures/a/b.tga").unwrap(), expected);
        assert_eq!(index.texture_file("textures/a/b").unwrap(), expected);
        assert_eq!(
            index.texture_file("textures/a/c.tga").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn levelshot_reads_file_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let index = ready_index(dir.path());
        let image = index.levelshot("dm1").unwrap();
        assert_eq!(image.ext, "png");
        assert_eq!(image.data, b"png-bytes");
        assert_eq!(index.levelshot("gone").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(index.levelshot("none").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn missing_map_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let index = ready_index(dir.path());
        assert_eq!(index.map("alpha").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(index.map("beta").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reset_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = ready_index(dir.path());
        assert_eq!(index.shader("textures/a/b").unwrap().package, "a.pk3");
        index.reset();
        assert!(!index.is_ready());
        for kind in AssetKind::ALL {
            assert_eq!(index.count(kind), 0);
        }
    }
}
