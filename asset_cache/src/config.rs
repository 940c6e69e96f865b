use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// One ingestion pass: source directories in precedence order and the
/// cache root they are converted into.
///
/// ```toml
/// sources = ["baseoa", "missionpack"]
/// cache_root = "cache"
/// dedup = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    pub cache_root: PathBuf,
    #[serde(default = "default_dedup")]
    pub dedup: bool,
}

fn default_dedup() -> bool {
    true
}

#[derive(Clone, Debug, Default)]
pub struct ConfigValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl IngestConfig {
    pub fn new(sources: Vec<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            cache_root: cache_root.into(),
            dedup: true,
        }
    }

    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML config; relative paths are resolved against the
    /// directory containing the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse_toml(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn rebase(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.is_relative() {
                *source = base.join(&*source);
            }
        }
        if self.cache_root.is_relative() && !self.cache_root.as_os_str().is_empty() {
            self.cache_root = base.join(&self.cache_root);
        }
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();
        if self.cache_root.as_os_str().is_empty() {
            validation
                .errors
                .push("cache_root must not be empty".to_string());
        }
        if self.sources.is_empty() {
            validation
                .warnings
                .push("no source directories configured".to_string());
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.as_os_str().is_empty() {
                validation
                    .errors
                    .push("source directory must not be empty".to_string());
            } else if !seen.insert(source) {
                validation.warnings.push(format!(
                    "source directory {} is listed more than once",
                    source.display()
                ));
            }
        }
        validation
    }

    /// Validates and turns errors into a [`ConfigError::Invalid`]; warnings
    /// are returned for the caller to report.
    pub fn check(&self) -> Result<Vec<String>, ConfigError> {
        let validation = self.validate();
        if validation.is_ok() {
            Ok(validation.warnings)
        } else {
            Err(ConfigError::Invalid(validation.errors))
        }
    }
}
