use oci_spec::image::{Descriptor, ImageManifest, SCHEMA_VERSION};

use crate::digest::Digest;
use crate::error::ToolError;
use crate::media_type;
use crate::ToolResult;

macro_rules! err {
    ($($arg:tt)+) => (Err(ToolError::Format(format!($($arg)+))))
}

pub trait Validate
{
    fn validate(&self) -> ToolResult<()>;
}

impl Validate for Descriptor
{
    fn validate(&self) -> ToolResult<()>
    {
        Digest::try_from(self.digest())?;

        let size = self.size();
        if size < 0 {
            err!("Negative descriptor size: {}", size)?;
        }

        Ok(())
    }
}

impl Validate for ImageManifest
{
    fn validate(&self) -> ToolResult<()>
    {
        let schema_version = self.schema_version();
        if schema_version != SCHEMA_VERSION {
            err!(
                "Wrong manifest schemaVersion: {:?}, expected: {}",
                schema_version,
                SCHEMA_VERSION
            )?;
        }

        // mediaType is optional in OCI manifests
        if let Some(media_type) = self.media_type() {
            if !media_type::is_manifest_media_type(media_type) {
                err!("Wrong manifest mediaType: {}", media_type)?;
            }
        }

        self.config().validate()?;
        for layer in self.layers() {
            layer.validate()?;
        }

        Ok(())
    }
}
