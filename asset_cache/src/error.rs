use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::route::AssetKind;

/// Coarse classification of an [`IngestError`], looking through entry context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    NotFound,
    Usage,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format error in {context}: {message}")]
    Format { context: String, message: String },

    #[error("error in '{package}::{path}': {source}")]
    Entry {
        package: String,
        path: String,
        #[source]
        source: Box<IngestError>,
    },

    #[error("no {kind} named '{name}' found")]
    NotFound { kind: AssetKind, name: String },

    #[error("usage error: {0}")]
    Usage(String),
}

impl IngestError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn format(context: impl Into<String>, message: impl ToString) -> Self {
        IngestError::Format {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(kind: AssetKind, name: impl Into<String>) -> Self {
        IngestError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn in_entry(self, package: &str, path: &str) -> Self {
        match self {
            // Already attributed by an inner layer.
            IngestError::Entry { .. } => self,
            other => IngestError::Entry {
                package: package.to_string(),
                path: path.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Io { .. } => ErrorKind::Io,
            IngestError::Format { .. } => ErrorKind::Format,
            IngestError::Entry { source, .. } => source.kind(),
            IngestError::NotFound { .. } => ErrorKind::NotFound,
            IngestError::Usage(_) => ErrorKind::Usage,
        }
    }
}
