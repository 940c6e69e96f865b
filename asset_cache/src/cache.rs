use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use compat_quake::shader::Shader;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::IngestError;

pub const MAPS_DIR: &str = "maps";
pub const SHADER_INDEX_FILE: &str = "shaders.json";

/// Whether a cache operation found its target already on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

/// Derived files under one cache root. A target file that exists is taken
/// as already built and is never rewritten.
#[derive(Clone, Debug)]
pub struct ConversionCache {
    root: PathBuf,
}

impl ConversionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), IngestError> {
        fs::create_dir_all(&self.root).map_err(|err| IngestError::io(&self.root, err))
    }

    pub fn map_target(&self, name: &str) -> PathBuf {
        self.root.join(MAPS_DIR).join(format!("{}.json", name))
    }

    /// Mirrors the entry path under the root, with `.tga` becoming `.png`.
    pub fn image_target(&self, entry_path: &str) -> PathBuf {
        match entry_path.strip_suffix(".tga") {
            Some(stem) => self.root.join(format!("{}.png", stem)),
            None => self.root.join(entry_path),
        }
    }

    pub fn shader_index_path(&self) -> PathBuf {
        self.root.join(SHADER_INDEX_FILE)
    }

    /// Writes `build()` to `target` unless the file exists already.
    pub fn materialize<F>(&self, target: &Path, build: F) -> Result<CacheOutcome, IngestError>
    where
        F: FnOnce() -> Result<Vec<u8>, IngestError>,
    {
        if target.is_file() {
            debug!(target = %target.display(), "cache hit");
            return Ok(CacheOutcome::Hit);
        }
        let contents = build()?;
        write_file(target, &contents)?;
        debug!(target = %target.display(), bytes = contents.len(), "cache miss, built");
        Ok(CacheOutcome::Built)
    }
}

/// Writes through a temporary file in the target directory and renames it
/// into place, so an interrupted write never leaves a truncated target.
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), IngestError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| IngestError::io(parent, err))?;
    let mut temp = NamedTempFile::new_in(parent).map_err(|err| IngestError::io(parent, err))?;
    temp.write_all(contents).map_err(|err| IngestError::io(temp.path(), err))?;
    temp.persist(path).map_err(|err| IngestError::io(path, err.error))?;
    Ok(())
}

/// A parsed shader with the package and entry it was read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderRecord {
    #[serde(flatten)]
    pub shader: Shader,
    pub package: String,
    pub path: String,
}

/// Shader definitions gathered during a pass, keyed by declared name.
/// A later definition replaces an earlier one of the same name.
#[derive(Clone, Debug, Default)]
pub struct ShaderRegistry {
    shaders: BTreeMap<String, ShaderRecord>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ShaderRecord) -> Option<ShaderRecord> {
        self.shaders.insert(record.shader.name.clone(), record)
    }

    pub fn get(&self, name: &str) -> Option<&ShaderRecord> {
        self.shaders.get(name)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shaders.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &ShaderRecord> {
        self.shaders.values()
    }

    pub fn clear(&mut self) {
        self.shaders.clear();
    }

    pub fn to_json(&self) -> Result<String, IngestError> {
        let records: Vec<&ShaderRecord> = self.shaders.values().collect();
        serde_json::to_string_pretty(&records)
            .map_err(|err| IngestError::format(SHADER_INDEX_FILE, err))
    }

    /// Rewrites the shader index file in full.
    pub fn write(&self, path: &Path) -> Result<(), IngestError> {
        let json = self.to_json()?;
        write_file(path, json.as_bytes())
    }
}
