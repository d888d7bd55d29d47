//! Push and pull through an external transport.
//!
//! Both operations own a scratch directory for their whole duration. It is
//! held as a [`tempfile::TempDir`], so it is removed on every return path.

use log::{debug, info};
use std::path::Path;

use crate::builder::ImageBuilder;
use crate::config::Config;
use crate::extractor::Extractor;
use crate::transport::{Location, Transport};
use crate::ToolResult;

/// Pack `files` into an image and copy it to `reference`
pub fn push<T, P>(transport: &T, reference: &str, files: &[P], config: &Config) -> ToolResult<()>
where
    T: Transport + ?Sized,
    P: AsRef<Path>,
{
    let scratch = config.scratch_dir()?;
    debug!("Scratch directory: \"{}\"", scratch.path().display());

    ImageBuilder::new(scratch.path())
        .compression(config.compression)
        .build(files)?;

    transport.copy(
        &Location::Dir(scratch.path().to_path_buf()),
        &Location::Docker(reference.to_string()),
    )?;

    info!("Pushed {}", reference);

    Ok(())
}

/// Copy `reference` locally and unpack its files into `output`
pub fn pull<T, P>(transport: &T, reference: &str, output: P, config: &Config) -> ToolResult<usize>
where
    T: Transport + ?Sized,
    P: AsRef<Path>,
{
    let scratch = config.scratch_dir()?;
    debug!("Scratch directory: \"{}\"", scratch.path().display());

    transport.copy(
        &Location::Docker(reference.to_string()),
        &Location::Dir(scratch.path().to_path_buf()),
    )?;

    let written = Extractor::new(scratch.path())
        .strict(config.strict)
        .extract(output)?;

    info!("Pulled {}, {} file(s) extracted", reference, written);

    Ok(written)
}
