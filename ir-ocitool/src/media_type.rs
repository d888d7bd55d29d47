use flate2::read::GzDecoder;
use log::error;
pub use oci_spec::image::MediaType;
use std::io::{BufReader, Read};

use crate::{error::ToolError, ToolResult};

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_IMAGE_CONFIG_V1: &str = "application/vnd.docker.container.image.v1+json";
pub const DOCKER_LAYER_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const DOCKER_LAYER_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// How the layer tar stream is stored inside its blob
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum Compression
{
    /// tar file compressed by Gzip
    #[default]
    Gzip,
    /// plain tar file
    None,
}

impl Compression
{
    pub fn layer_media_type(self) -> MediaType
    {
        match self {
            Self::Gzip => MediaType::Other(DOCKER_LAYER_TAR_GZIP.to_string()),
            Self::None => MediaType::Other(DOCKER_LAYER_TAR.to_string()),
        }
    }

    pub fn from_media_type(media_type: &MediaType) -> ToolResult<Self>
    {
        match media_type.to_string().as_str() {
            DOCKER_LAYER_TAR | OCI_LAYER_TAR => Ok(Self::None),
            DOCKER_LAYER_TAR_GZIP | OCI_LAYER_TAR_GZIP => Ok(Self::Gzip),
            _ => {
                error!("Unsupported layer media type: {}", media_type);
                Err(ToolError::Format(format!(
                    "Unsupported layer media type: {}",
                    media_type
                )))
            }
        }
    }
}

pub fn manifest_media_type() -> MediaType
{
    MediaType::Other(DOCKER_MANIFEST_V2.to_string())
}

pub fn config_media_type() -> MediaType
{
    MediaType::Other(DOCKER_IMAGE_CONFIG_V1.to_string())
}

pub fn is_manifest_media_type(media_type: &MediaType) -> bool
{
    matches!(
        media_type.to_string().as_str(),
        DOCKER_MANIFEST_V2 | OCI_MANIFEST_V1
    )
}

pub fn get_layer_reader<R: Read + 'static>(
    reader: R,
    media_type: &MediaType,
) -> ToolResult<Box<dyn Read>>
{
    match Compression::from_media_type(media_type)? {
        Compression::None => Ok(Box::new(BufReader::new(reader))),
        Compression::Gzip => Ok(Box::new(GzDecoder::new(BufReader::new(reader)))),
    }
}
