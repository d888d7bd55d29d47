mod utils;
mod validate;

pub mod builder;
pub mod config;
pub mod digest;
pub mod error;
pub mod extractor;
pub mod media_type;
pub mod registry;
pub mod transport;

pub type ToolResult<T> = Result<T, error::ToolError>;

pub use builder::{Blob, Image, ImageBuilder, MANIFEST_JSON};
pub use config::Config;
pub use extractor::Extractor;
pub use media_type::Compression;
pub use registry::{pull, push};
pub use transport::{Location, Skopeo, Transport};
