use std::path::PathBuf;
use tempfile::TempDir;

use crate::media_type::Compression;
use crate::transport::Skopeo;

pub const DEFAULT_SKOPEO: &str = "skopeo";
pub const SCRATCH_PREFIX: &str = "ir-ocitool-";

#[derive(Debug, Clone)]
pub struct Config
{
    /// registry transport binary
    pub skopeo: String,
    /// extra arguments for every `skopeo copy`
    pub skopeo_args: Vec<String>,
    pub compression: Compression,
    /// fail a pull when a layer blob is missing instead of skipping it
    pub strict: bool,
    /// parent of scratch directories, none for the system temp dir
    pub scratch_root: Option<PathBuf>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Config {
            skopeo: DEFAULT_SKOPEO.to_string(),
            skopeo_args: Vec::new(),
            compression: Compression::default(),
            strict: false,
            scratch_root: None,
        }
    }
}

impl Config
{
    pub fn transport(&self) -> Skopeo
    {
        Skopeo::new(self.skopeo.clone()).args(self.skopeo_args.clone())
    }

    /// Fresh scratch directory, removed when the returned guard is dropped
    pub fn scratch_dir(&self) -> std::io::Result<TempDir>
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}
