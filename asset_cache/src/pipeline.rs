use tracing::{debug, info, trace};

use crate::cache::{CacheOutcome, ConversionCache, ShaderRecord};
use crate::config::IngestConfig;
use crate::convert::{AssetConverter, QuakeConverter};
use crate::error::IngestError;
use crate::index::AssetIndex;
use crate::package::PackageEntry;
use crate::route::{classify, image_extension, AssetKind, AssetRoute};
use crate::stream::PackageStream;

/// Counters for one ingestion pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub packages: usize,
    /// Entries the stream emitted, duplicates excluded.
    pub entries: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub maps: usize,
    pub textures: usize,
    pub levelshots: usize,
    pub shader_files: usize,
    pub shader_definitions: usize,
    pub cache_hits: usize,
    pub conversions: usize,
}

impl IngestReport {
    pub fn routed(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Map => self.maps,
            AssetKind::Texture => self.textures,
            AssetKind::Levelshot => self.levelshots,
            AssetKind::Shader => self.shader_files,
        }
    }

    fn record(&mut self, kind: AssetKind, outcome: CacheOutcome) {
        match kind {
            AssetKind::Map => self.maps += 1,
            AssetKind::Texture => self.textures += 1,
            AssetKind::Levelshot => self.levelshots += 1,
            AssetKind::Shader => self.shader_files += 1,
        }
        match outcome {
            CacheOutcome::Hit => self.cache_hits += 1,
            CacheOutcome::Built => self.conversions += 1,
        }
    }
}

/// Streams every configured package through the router into the cache and
/// keeps the resulting index.
pub struct AssetPipeline<C = QuakeConverter> {
    config: IngestConfig,
    converter: C,
    cache: ConversionCache,
    index: AssetIndex,
}

impl AssetPipeline<QuakeConverter> {
    pub fn new(config: IngestConfig) -> Self {
        Self::with_converter(config, QuakeConverter)
    }
}

impl<C: AssetConverter> AssetPipeline<C> {
    pub fn with_converter(config: IngestConfig, converter: C) -> Self {
        let cache = ConversionCache::new(config.cache_root.clone());
        Self {
            config,
            converter,
            cache,
            index: AssetIndex::new(),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    /// Runs one full pass. The index is cleared first and becomes
    /// queryable only if the pass succeeds; on error the cache may hold a
    /// partial tree that a later run completes.
    pub fn run(&mut self) -> Result<IngestReport, IngestError> {
        self.index.reset();
        let validation = self.config.validate();
        if !validation.is_ok() {
            return Err(IngestError::Usage(validation.errors.join("; ")));
        }
        info!(
            sources = self.config.sources.len(),
            cache_root = %self.config.cache_root.display(),
            dedup = self.config.dedup,
            "ingestion started"
        );
        self.cache.ensure_root()?;

        let Self {
            config,
            converter,
            cache,
            index,
        } = self;
        let mut report = IngestReport::default();
        let mut stream = PackageStream::new(config.sources.iter().cloned(), config.dedup);
        let stats =
            stream.for_each(|entry| route_entry(cache, index, converter, &mut report, entry))?;
        report.packages = stats.packages;
        report.entries = stats.emitted;
        report.duplicates = stats.duplicates;

        let shader_index = cache.shader_index_path();
        index.shader_registry().write(&shader_index)?;
        debug!(
            path = %shader_index.display(),
            shaders = index.count(AssetKind::Shader),
            "wrote shader index"
        );
        index.mark_ready();

        info!(
            packages = report.packages,
            entries = report.entries,
            duplicates = report.duplicates,
            maps = report.maps,
            textures = report.textures,
            levelshots = report.levelshots,
            shaders = report.shader_definitions,
            cache_hits = report.cache_hits,
            conversions = report.conversions,
            "ingestion finished"
        );
        Ok(report)
    }
}

fn route_entry<C: AssetConverter>(
    cache: &ConversionCache,
    index: &mut AssetIndex,
    converter: &mut C,
    report: &mut IngestReport,
    mut entry: PackageEntry<'_>,
) -> Result<(), IngestError> {
    let Some(AssetRoute { kind, name }) = classify(entry.path()) else {
        trace!(entry = %entry.path(), "ignoring entry");
        report.ignored += 1;
        return Ok(());
    };
    let context = format!("{}::{}", entry.package().label(), entry.path());

    match kind {
        AssetKind::Map => {
            let target = cache.map_target(&name);
            let outcome = cache.materialize(&target, || {
                let bytes = entry.bytes()?;
                Ok(converter.convert_map(&context, bytes)?.into_bytes())
            })?;
            report.record(kind, outcome);
            index.insert(kind, name, target);
        }
        AssetKind::Texture | AssetKind::Levelshot => {
            let target = cache.image_target(entry.path());
            let convert = image_extension(entry.path()) == Some("tga");
            let outcome = cache.materialize(&target, || {
                let bytes = entry.bytes()?;
                if convert {
                    converter.convert_image(&context, bytes)
                } else {
                    Ok(bytes.to_vec())
                }
            })?;
            report.record(kind, outcome);
            index.insert(kind, name, target);
        }
        AssetKind::Shader => {
            let text = entry.text()?;
            let shaders = converter.parse_shaders(&context, &text)?;
            let package = entry.package().label();
            debug!(entry = %entry.path(), shaders = shaders.len(), "parsed shader script");
            report.record(kind, CacheOutcome::Built);
            report.shader_definitions += shaders.len();
            let registry = index.shaders_mut();
            for shader in shaders {
                let record = ShaderRecord {
                    shader,
                    package: package.clone(),
                    path: entry.path().to_string(),
                };
                if let Some(previous) = registry.insert(record) {
                    trace!(
                        shader = %previous.shader.name,
                        previous = %previous.path,
                        "shader definition replaced"
                    );
                }
            }
        }
    }
    entry.ack();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{bsp_with_nan_plane, minimal_bsp, truecolor_tga, write_pk3};
    use compat_quake::shader::Shader;
    use std::path::Path;

    #[derive(Default)]
    struct CountingConverter {
        maps: usize,
        images: usize,
        scripts: usize,
    }

    impl AssetConverter for CountingConverter {
        fn convert_map(&mut self, _context: &str, data: &[u8]) -> Result<String, IngestError> {
            self.maps += 1;
            Ok(format!("{{\"len\":{}}}", data.len()))
        }

        fn convert_image(&mut self, _context: &str, data: &[u8]) -> Result<Vec<u8>, IngestError> {
            self.images += 1;
            Ok(data.to_vec())
        }

        fn parse_shaders(&mut self, _context: &str, text: &str) -> Result<Vec<Shader>, IngestError> {
            self.scripts += 1;
            Ok(text
                .lines()
                .map(|name| Shader {
                    name: name.to_string(),
                    directives: Vec::new(),
                    stages: Vec::new(),
                })
                .collect())
        }
    }

    fn source(root: &Path) -> std::path::PathBuf {
        let dir = root.join("baseoa");
        write_pk3(
            &dir,
            "pak0.pk3",
            &[
                ("maps/dm1.bsp", b"bsp"),
                ("textures/base/wall.tga", b"tga"),
                ("textures/base/floor.jpg", b"jpg"),
                ("levelshots/dm1.jpg", b"shot"),
                ("scripts/base.shader", b"textures/base/wall\ntextures/base/floor"),
                ("sound/hit.wav", b"wav"),
            ],
        );
        dir
    }

    #[test]
    fn routes_each_kind_once() {
        let root = tempfile::tempdir().unwrap();
        let config = IngestConfig::new(vec![source(root.path())], root.path().join("cache"));
        let mut pipeline = AssetPipeline::with_converter(config, CountingConverter::default());
        assert!(!pipeline.index().is_ready());

        let report = pipeline.run().unwrap();
        assert_eq!(report.packages, 1);
        assert_eq!(report.entries, 6);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.routed(AssetKind::Map), 1);
        assert_eq!(report.routed(AssetKind::Texture), 2);
        assert_eq!(report.routed(AssetKind::Levelshot), 1);
        assert_eq!(report.routed(AssetKind::Shader), 1);
        assert_eq!(report.shader_definitions, 2);
        assert_eq!(report.conversions, 5);
        assert_eq!(pipeline.converter().maps, 1);
        assert_eq!(pipeline.converter().images, 1);

        let cache = root.path().join("cache");
        assert!(cache.join("maps/dm1.json").is_file());
        assert!(cache.join("textures/base/wall.png").is_file());
        assert_eq!(std::fs::read(cache.join("textures/base/floor.jpg")).unwrap(), b"jpg");
        assert!(cache.join("shaders.json").is_file());

        let index = pipeline.index();
        assert!(index.is_ready());
        assert_eq!(index.map_names().unwrap(), vec!["dm1"]);
        assert_eq!(
            index.texture_file("textures/base/wall.tga").unwrap(),
            cache.join("textures/base/wall.png")
        );
        assert_eq!(index.levelshot("dm1").unwrap().data, b"shot");
        assert!(index.shader("textures/base/floor").unwrap().package.ends_with("pak0.pk3"));
    }

    #[test]
    fn second_run_hits_the_cache() {
        let root = tempfile::tempdir().unwrap();
        let config = IngestConfig::new(vec![source(root.path())], root.path().join("cache"));
        let mut pipeline = AssetPipeline::with_converter(config, CountingConverter::default());
        pipeline.run().unwrap();
        let report = pipeline.run().unwrap();
        assert_eq!(report.cache_hits, 4);
        assert_eq!(report.conversions, 1);
        assert_eq!(pipeline.converter().maps, 1);
        assert_eq!(pipeline.converter().images, 1);
        assert_eq!(pipeline.converter().scripts, 2);
        assert_eq!(pipeline.index().texture_names().unwrap().len(), 2);
    }

    #[test]
    fn real_converter_builds_png_and_map_json() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("src");
        let tga = truecolor_tga(1, 1, &[1, 2, 3]);
        let bsp = minimal_bsp();
        write_pk3(
            &dir,
            "pak0.pk3",
            &[("maps/q3dm1.bsp", bsp.as_slice()), ("levelshots/q3dm1.tga", tga.as_slice())],
        );
        let mut pipeline = AssetPipeline::new(IngestConfig::new(vec![dir], root.path().join("cache")));
        pipeline.run().unwrap();
        let index = pipeline.index();
        assert_eq!(index.map("q3dm1").unwrap().header.version, 46);
        let shot = index.levelshot("q3dm1").unwrap();
        assert_eq!(shot.ext, "png");
        assert!(shot.data.starts_with(b"\x89PNG"));
    }

    #[test]
    fn conversion_failure_aborts_with_entry_context() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("src");
        write_pk3(
            &dir,
            "pak0.pk3",
            &[("maps/broken.bsp", b"nope"), ("maps/after.bsp", b"nope")],
        );
        let cache = root.path().join("cache");
        let mut pipeline = AssetPipeline::new(IngestConfig::new(vec![dir], &cache));
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("pak0.pk3::maps/broken.bsp"));
        assert!(!cache.join("maps/broken.json").exists());
        assert!(!cache.join("maps/after.json").exists());
        assert!(!pipeline.index().is_ready());
        assert_eq!(pipeline.index().map_names().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn invalid_config_is_usage_error() {
        let mut pipeline = AssetPipeline::new(IngestConfig::new(Vec::new(), ""));
        assert_eq!(pipeline.run().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn map_with_non_finite_float_fails_the_pass() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("src");
        let bsp = bsp_with_nan_plane();
        write_pk3(&dir, "pak0.pk3", &[("maps/nan.bsp", bsp.as_slice())]);
        let cache = root.path().join("cache");
        let mut pipeline = AssetPipeline::new(IngestConfig::new(vec![dir], &cache));
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("pak0.pk3::maps/nan.bsp"));
        assert!(!cache.join("maps/nan.json").exists());
    }

    #[test]
    fn shader_script_with_latin1_comment_is_ingested() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("src");
        write_pk3(
            &dir,
            "pak0.pk3",
            &[(
                "scripts/a.shader",
                b"// caf\xe9 au lait\ntextures/a/b\n{\n surfaceparm nodraw\n}\n",
            )],
        );
        let mut pipeline =
            AssetPipeline::new(IngestConfig::new(vec![dir], root.path().join("cache")));
        let report = pipeline.run().unwrap();
        assert_eq!(report.shader_definitions, 1);
        let record = pipeline.index().shader("textures/a/b").unwrap();
        assert_eq!(record.path, "scripts/a.shader");
    }
}
