//! Ingests pk3 packages from ordered source directories into an on-disk
//! cache of converted maps, images and shader definitions.
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod index;
pub mod package;
pub mod pipeline;
pub mod route;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use cache::{CacheOutcome, ConversionCache, ShaderRecord, ShaderRegistry};
pub use config::{ConfigError, ConfigValidation, IngestConfig};
pub use convert::{AssetConverter, QuakeConverter};
pub use error::{ErrorKind, IngestError};
pub use index::{AssetIndex, Image};
pub use package::{discover_packages, PackageEntry, PackageInfo, PackageReader};
pub use pipeline::{AssetPipeline, IngestReport};
pub use route::{classify, AssetKind, AssetRoute};
pub use stream::{PackageStream, StreamStats};
