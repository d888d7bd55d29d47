//! Directory-format image assembly.
//!
//! An image is written as three files in one directory: the layer blob and the
//! config blob, both named after the hex part of their sha256 digest, and a
//! `manifest.json` referencing them. The manifest is renamed into place last,
//! so its presence means the blobs it points to are complete.

use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression as GzLevel};
use log::{debug, info};
use oci_spec::image::{
    Arch, ConfigBuilder, Descriptor, DescriptorBuilder, HistoryBuilder,
    ImageConfigurationBuilder, ImageManifestBuilder, Os, RootFsBuilder, SCHEMA_VERSION,
};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::HeaderMode;

use crate::digest::Digest;
use crate::error::ToolError;
use crate::media_type::{self, Compression, MediaType};
use crate::{utils, ToolResult};

pub const MANIFEST_JSON: &str = "manifest.json";

const LAYER_PARTIAL: &str = "layer.partial";
const CONFIG_PARTIAL: &str = "config.partial";
const MANIFEST_PARTIAL: &str = "manifest.partial";

const ROOTFS_TYPE: &str = "layers";
const CREATED_BY: &str = env!("CARGO_PKG_NAME");
const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000000000Z";

macro_rules! err {
    ($($arg:tt)+) => (Err(ToolError::Input(format!($($arg)+))))
}

/// A finished blob, stored under its digest name
#[derive(Debug, Clone)]
pub struct Blob
{
    pub path: PathBuf,
    pub size: u64,
    pub digest: Digest,
}

impl Blob
{
    /// Hash `path` as it is on disk and move it to its digest name in `dir`
    pub(crate) fn commit(dir: &Path, path: &Path) -> ToolResult<Self>
    {
        let digest = Digest::sha256_file(path)?;
        let size = utils::file_len(path)?;
        let final_path = dir.join(digest.file_name());

        fs::rename(path, &final_path)?;
        debug!("Blob {} ({} bytes) stored as \"{}\"", digest, size, final_path.display());

        Ok(Blob {
            path: final_path,
            size,
            digest,
        })
    }

    fn descriptor(&self, media_type: MediaType) -> ToolResult<Descriptor>
    {
        let size = i64::try_from(self.size)
            .map_err(|_| ToolError::Format(format!("Blob too large: {}", self.size)))?;

        Ok(DescriptorBuilder::default()
            .media_type(media_type)
            .size(size)
            .digest(self.digest.to_string())
            .build()?)
    }
}

/// Files making up one directory-format image
#[derive(Debug, Clone)]
pub struct Image
{
    pub layer: Blob,
    pub config: Blob,
    pub manifest: PathBuf,
}

pub struct ImageBuilder
{
    dest: PathBuf,
    compression: Compression,
    created: DateTime<Utc>,
}

impl ImageBuilder
{
    pub fn new<P: AsRef<Path>>(dest: P) -> Self
    {
        Self {
            dest: dest.as_ref().to_path_buf(),
            compression: Compression::default(),
            created: Utc::now(),
        }
    }

    pub fn compression(mut self, compression: Compression) -> Self
    {
        self.compression = compression;
        self
    }

    /// Creation time recorded in the config, defaults to the time of `new()`
    pub fn created(mut self, created: DateTime<Utc>) -> Self
    {
        self.created = created;
        self
    }

    /// Pack `files` into an image in the destination directory.
    ///
    /// Entries are named after the file base names, in the given order.
    /// An empty list gives a valid image with an empty layer.
    pub fn build<P: AsRef<Path>>(&self, files: &[P]) -> ToolResult<Image>
    {
        info!(
            "Building image from {} file(s) in \"{}\"",
            files.len(),
            self.dest.display()
        );

        let names = check_inputs(files)?;
        fs::create_dir_all(&self.dest)?;

        let layer = self.write_layer(files, &names)?;
        self.finish(layer)
    }

    /// Write the config and the manifest for an already committed layer
    pub(crate) fn finish(&self, layer: Blob) -> ToolResult<Image>
    {
        let config = self.write_config(&layer)?;
        let manifest = self.write_manifest(&layer, &config)?;

        info!(
            "Image ready, layer: {}, config: {}",
            layer.digest, config.digest
        );

        Ok(Image {
            layer,
            config,
            manifest,
        })
    }

    fn write_layer<P: AsRef<Path>>(&self, files: &[P], names: &[String]) -> ToolResult<Blob>
    {
        let partial = self.dest.join(LAYER_PARTIAL);

        write_partial(&partial, |path| {
            let file = BufWriter::new(File::create(path)?);
            let mut file = match self.compression {
                Compression::Gzip => {
                    let encoder = GzEncoder::new(file, GzLevel::best());
                    append_files(encoder, files, names)?.finish()?
                }
                Compression::None => append_files(file, files, names)?,
            };
            file.flush()?;
            Ok(())
        })?;

        Blob::commit(&self.dest, &partial)
    }

    fn write_config(&self, layer: &Blob) -> ToolResult<Blob>
    {
        let created = self.created.format(CREATED_FORMAT).to_string();

        // diff_ids carry the digest of the stored layer blob, compressed or not
        let rootfs = RootFsBuilder::default()
            .typ(ROOTFS_TYPE)
            .diff_ids(vec![layer.digest.to_string()])
            .build()?;
        let history = HistoryBuilder::default()
            .created(created.clone())
            .created_by(CREATED_BY)
            .build()?;
        let config = ImageConfigurationBuilder::default()
            .created(created)
            .architecture(Arch::Amd64)
            .os(Os::Linux)
            .config(ConfigBuilder::default().build()?)
            .rootfs(rootfs)
            .history(vec![history])
            .build()?;

        // the digest is taken from exactly these bytes once written
        let json = serde_json::to_vec(&config)?;
        let partial = self.dest.join(CONFIG_PARTIAL);
        write_partial(&partial, |path| Ok(utils::file_write(path, &json)?))?;

        Blob::commit(&self.dest, &partial)
    }

    fn write_manifest(&self, layer: &Blob, config: &Blob) -> ToolResult<PathBuf>
    {
        let manifest = ImageManifestBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .media_type(media_type::manifest_media_type())
            .config(config.descriptor(media_type::config_media_type())?)
            .layers(vec![layer.descriptor(self.compression.layer_media_type())?])
            .build()?;

        let json = serde_json::to_vec(&manifest)?;
        let partial = self.dest.join(MANIFEST_PARTIAL);
        write_partial(&partial, |path| Ok(utils::file_write(path, &json)?))?;

        let path = self.dest.join(MANIFEST_JSON);
        fs::rename(&partial, &path)?;
        debug!("Manifest written to \"{}\"", path.display());

        Ok(path)
    }
}

/// Regular, readable files with distinct base names, returns those names
fn check_inputs<P: AsRef<Path>>(files: &[P]) -> ToolResult<Vec<String>>
{
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(files.len());

    for file in files {
        let file = file.as_ref();
        let metadata = match fs::metadata(file) {
            Ok(m) => m,
            Err(e) => err!("Cannot access \"{}\": {}", file.display(), e)?,
        };
        if !metadata.is_file() {
            err!("Not a regular file: \"{}\"", file.display())?;
        }
        if let Err(e) = File::open(file) {
            err!("Cannot read \"{}\": {}", file.display(), e)?;
        }

        let name = utils::base_name(file)?;
        if !seen.insert(name.clone()) {
            err!("Duplicate file name in layer: \"{}\"", name)?;
        }
        names.push(name);
    }

    Ok(names)
}

fn append_files<W: Write, P: AsRef<Path>>(
    writer: W,
    files: &[P],
    names: &[String],
) -> ToolResult<W>
{
    let mut builder = tar::Builder::new(writer);
    builder.mode(HeaderMode::Deterministic);

    for (file, name) in files.iter().zip(names) {
        let file = file.as_ref();
        debug!("Adding \"{}\" as \"{}\"", file.display(), name);

        if let Err(e) = builder.append_path_with_name(file, name) {
            err!("Failed to add \"{}\" to layer: {}", file.display(), e)?;
        }
    }

    Ok(builder.into_inner()?)
}

/// Run `write` on a temporary file, removing it if anything fails
fn write_partial<F>(path: &Path, write: F) -> ToolResult<()>
where
    F: FnOnce(&Path) -> ToolResult<()>,
{
    let result = write(path);
    if result.is_err() && path.exists() {
        let _ = fs::remove_file(path);
    }
    result
}
