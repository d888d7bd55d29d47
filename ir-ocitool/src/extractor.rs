use clean_path::Clean;
use log::{debug, error, info, warn};
use oci_spec::image::{ImageManifest, MediaType};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::builder::MANIFEST_JSON;
use crate::digest::Digest;
use crate::error::ToolError;
use crate::media_type;
use crate::validate::Validate;
use crate::{utils, ToolResult};

macro_rules! err {
    ($($arg:tt)+) => (Err(ToolError::Format(format!($($arg)+))))
}

/// Unpacks the layers of a directory-format image
pub struct Extractor
{
    image: PathBuf,
    strict: bool,
}

impl Extractor
{
    pub fn new<P: AsRef<Path>>(image: P) -> Self
    {
        Self {
            image: image.as_ref().to_path_buf(),
            strict: false,
        }
    }

    /// Fail on layers whose blob is missing instead of skipping them
    pub fn strict(mut self, strict: bool) -> Self
    {
        self.strict = strict;
        self
    }

    pub fn read_manifest(&self) -> ToolResult<ImageManifest>
    {
        let path = self.image.join(MANIFEST_JSON);
        if !path.is_file() {
            err!("No \"{}\" in \"{}\"", MANIFEST_JSON, self.image.display())?;
        }

        let manifest = match ImageManifest::from_file(&path) {
            Ok(m) => m,
            Err(e) => err!("Error importing \"{}\": {}", MANIFEST_JSON, e)?,
        };

        manifest.validate()?;

        Ok(manifest)
    }

    /// Unpack every layer into `output`, returns the number of distinct files
    /// written. A path written again by a later entry or layer counts once.
    pub fn extract<P: AsRef<Path>>(&self, output: P) -> ToolResult<usize>
    {
        let manifest = self.read_manifest()?;

        fs::create_dir_all(output.as_ref())?;
        let root = fs::canonicalize(output.as_ref())?;

        info!(
            "Extracting {} layer(s) from \"{}\" into \"{}\"",
            manifest.layers().len(),
            self.image.display(),
            root.display()
        );

        let mut written = HashSet::new();
        for desc in manifest.layers() {
            let digest = Digest::try_from(desc.digest())?;
            let path = self.image.join(digest.file_name());

            if !path.is_file() {
                if self.strict {
                    error!("Layer blob missing: {}", digest);
                    err!("Layer blob missing: {}", digest)?;
                }
                warn!("Layer blob missing, skipping: {}", digest);
                continue;
            }

            let size = utils::file_len(&path)?;
            if i64::try_from(size).ok() != Some(desc.size()) {
                err!("Wrong layer size: {}, expected: {}", size, desc.size())?;
            }
            if !digest.verify_file(&path)? {
                error!("Layer digest mismatch for \"{}\"", path.display());
                err!("Layer digest mismatch: {}", digest)?;
            }

            unpack_layer(&path, desc.media_type(), &root, &mut written)?;
            debug!("Layer {} unpacked", digest);
        }

        info!("Extracted {} file(s)", written.len());

        Ok(written.len())
    }
}

fn unpack_layer(
    layer: &Path,
    media_type: &MediaType,
    root: &Path,
    written: &mut HashSet<PathBuf>,
) -> ToolResult<()>
{
    debug!(
        "Unpacking layer: \"{}\" ({}) onto: \"{}\"",
        layer.display(),
        media_type,
        root.display()
    );

    let reader = media_type::get_layer_reader(File::open(layer)?, media_type)?;
    let mut archive = Archive::new(reader);

    let entries = archive.entries().map_err(archive_error)?;
    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;

        let entry_path = match entry.path() {
            Ok(p) => p.into_owned(),
            Err(e) => err!("Archive entry has invalid path: {}", e)?,
        };
        let target = guard_path(root, &entry_path)?;

        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() && !entry_type.is_dir() {
            warn!(
                "Skipping entry \"{}\" of type {:?}",
                entry_path.display(),
                entry_type
            );
            continue;
        }

        debug!(
            "Unpacking entry: \"{}\" onto: \"{}\"",
            entry_path.display(),
            target.display()
        );

        let unpacked = entry
            .unpack_in(root)
            .map_err(|e| unpack_error(&target, e))?;
        if !unpacked {
            error!("Entry refused by unpacker: \"{}\"", entry_path.display());
            return Err(ToolError::Security(format!(
                "Entry escapes output directory: \"{}\"",
                entry_path.display()
            )));
        }

        if entry_type.is_file() {
            written.insert(target);
        } else {
            written.remove(&target);
        }
    }

    // read the stream to the end so trailing corruption is not missed
    let mut reader = archive.into_inner();
    io::copy(&mut reader, &mut io::sink()).map_err(archive_error)?;

    Ok(())
}

/// Resolve an entry path under `root`, refusing anything that lands outside
fn guard_path(root: &Path, entry: &Path) -> ToolResult<PathBuf>
{
    let target = root.join(entry).clean();
    let parent_dir = entry.components().any(|c| c == Component::ParentDir);
    if entry.is_absolute() || parent_dir || !target.starts_with(root) {
        error!("Archive entry escapes output directory: \"{}\"", entry.display());
        return Err(ToolError::Security(format!(
            "Entry escapes output directory: \"{}\"",
            entry.display()
        )));
    }

    Ok(target)
}

/// Entry data that cannot be read is a broken archive, the rest is local
fn unpack_error(target: &Path, e: io::Error) -> ToolError
{
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            archive_error(e)
        }
        _ => {
            error!("Failed to write \"{}\": {}", target.display(), e);
            ToolError::IO(e)
        }
    }
}

/// Errors from reading the layer stream, the data itself is broken
fn archive_error(e: io::Error) -> ToolError
{
    error!("Malformed layer archive: {}", e);
    ToolError::Format(format!("Malformed layer archive: {}", e))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::builder::tests::{input_file, read_json};
    use crate::builder::{Blob, ImageBuilder};
    use crate::media_type::Compression;
    use flate2::{write::GzEncoder, Compression as GzLevel};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8>
    {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Tar with a single regular entry whose name is written verbatim
    fn raw_tar(name: &str, data: &[u8]) -> Vec<u8>
    {
        let mut header = tar::Header::new_old();
        let raw_name = &mut header.as_old_mut().name;
        raw_name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, data).unwrap();
        builder.into_inner().unwrap()
    }

    /// Tar with one regular entry per `(name, data)` pair, names may repeat
    fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8>
    {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    /// Image whose layer blob holds exactly `layer` bytes
    fn image_with_layer(dir: &Path, layer: &[u8], compression: Compression)
    {
        let partial = dir.join("layer.raw");
        fs::write(&partial, layer).unwrap();
        let blob = Blob::commit(dir, &partial).unwrap();
        ImageBuilder::new(dir)
            .compression(compression)
            .finish(blob)
            .unwrap();
    }

    fn sorted_entries(dir: &Path) -> Vec<String>
    {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn round_trip()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [
            input_file(input.path(), "a.txt", b"hi"),
            input_file(input.path(), "b.bin", &[0x00, 0x01]),
        ];

        ImageBuilder::new(image.path()).build(&files).unwrap();
        let written = Extractor::new(image.path()).extract(output.path()).unwrap();

        assert_eq!(written, 2);
        assert_eq!(sorted_entries(output.path()), vec!["a.txt", "b.bin"]);
        assert_eq!(fs::read(output.path().join("a.txt")).unwrap(), b"hi");
        assert_eq!(fs::read(output.path().join("b.bin")).unwrap(), [0x00u8, 0x01]);
    }

    #[test]
    fn round_trip_uncompressed()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "plain.txt", b"plain")];

        ImageBuilder::new(image.path())
            .compression(Compression::None)
            .build(&files)
            .unwrap();
        let written = Extractor::new(image.path()).extract(output.path()).unwrap();

        assert_eq!(written, 1);
        assert_eq!(fs::read(output.path().join("plain.txt")).unwrap(), b"plain");
    }

    #[test]
    fn output_directory_is_created()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "a.txt", b"hi")];
        let nested = output.path().join("x").join("y");

        ImageBuilder::new(image.path()).build(&files).unwrap();
        Extractor::new(image.path()).extract(&nested).unwrap();

        assert_eq!(fs::read(nested.join("a.txt")).unwrap(), b"hi");
    }

    #[test]
    fn empty_image()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        ImageBuilder::new(image.path())
            .build::<PathBuf>(&[])
            .unwrap();
        let written = Extractor::new(image.path()).extract(output.path()).unwrap();

        assert_eq!(written, 0);
        assert!(sorted_entries(output.path()).is_empty());
    }

    #[test]
    fn path_traversal_is_rejected()
    {
        let image = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir().unwrap();
        let output = parent.path().join("out");

        image_with_layer(
            image.path(),
            &gzip(&raw_tar("../escape.txt", b"gotcha")),
            Compression::Gzip,
        );

        let result = Extractor::new(image.path()).extract(&output);
        assert!(matches!(result, Err(ToolError::Security(_))));
        assert!(!parent.path().join("escape.txt").exists());
        assert!(sorted_entries(&output).is_empty());
    }

    #[test]
    fn absolute_entry_is_rejected()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        image_with_layer(
            image.path(),
            &raw_tar("/tmp/absolute.txt", b"gotcha"),
            Compression::None,
        );

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Security(_))));
    }

    #[test]
    fn missing_manifest()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
    }

    #[test]
    fn malformed_manifest()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let manifest = image.path().join(MANIFEST_JSON);

        fs::write(&manifest, b"{not json").unwrap();
        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));

        // an array is valid JSON but not a manifest
        fs::write(&manifest, b"[]").unwrap();
        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
    }

    #[test]
    fn wrong_schema_version()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "a.txt", b"hi")];

        let built = ImageBuilder::new(image.path()).build(&files).unwrap();
        let mut manifest = read_json(&built.manifest);
        manifest["schemaVersion"] = serde_json::json!(1);
        fs::write(&built.manifest, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
    }

    #[test]
    fn missing_layer_blob()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "a.txt", b"hi")];

        let built = ImageBuilder::new(image.path()).build(&files).unwrap();
        fs::remove_file(&built.layer.path).unwrap();

        let written = Extractor::new(image.path()).extract(output.path()).unwrap();
        assert_eq!(written, 0);

        let result = Extractor::new(image.path())
            .strict(true)
            .extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
    }

    #[test]
    fn tampered_layer_blob()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "a.txt", b"hi")];

        let built = ImageBuilder::new(image.path()).build(&files).unwrap();
        let mut data = fs::read(&built.layer.path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        fs::write(&built.layer.path, data).unwrap();

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
        assert!(sorted_entries(output.path()).is_empty());
    }

    #[test]
    fn corrupt_gzip()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        image_with_layer(image.path(), b"definitely not gzip", Compression::Gzip);

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Format(_))));
    }

    #[test]
    fn inner_parent_dir_is_rejected()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        image_with_layer(
            image.path(),
            &raw_tar("dir/../b.txt", b"inside"),
            Compression::None,
        );

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::Security(_))));
        assert!(sorted_entries(output.path()).is_empty());
    }

    #[test]
    fn local_write_failure_is_io()
    {
        let input = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let files = [input_file(input.path(), "a.txt", b"hi")];

        ImageBuilder::new(image.path()).build(&files).unwrap();
        // a non-empty directory sits where the file has to go
        fs::create_dir_all(output.path().join("a.txt").join("x")).unwrap();

        let result = Extractor::new(image.path()).extract(output.path());
        assert!(matches!(result, Err(ToolError::IO(_))));
    }

    #[test]
    fn repeated_entry_counts_once()
    {
        let image = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        image_with_layer(
            image.path(),
            &tar_of(&[
                ("a.txt", &b"first"[..]),
                ("b.txt", &b"b"[..]),
                ("a.txt", &b"second"[..]),
            ]),
            Compression::None,
        );

        let written = Extractor::new(image.path()).extract(output.path()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read(output.path().join("a.txt")).unwrap(), b"second");
    }

    #[test]
    fn guard_path_resolution()
    {
        let root = Path::new("/srv/out");
        assert_eq!(
            guard_path(root, Path::new("a.txt")).unwrap(),
            PathBuf::from("/srv/out/a.txt")
        );
        assert_eq!(
            guard_path(root, Path::new("./dir/b.txt")).unwrap(),
            PathBuf::from("/srv/out/dir/b.txt")
        );
        // the unpacker refuses any `..`, even one that stays inside
        assert!(matches!(
            guard_path(root, Path::new("dir/../b.txt")),
            Err(ToolError::Security(_))
        ));
        assert!(matches!(
            guard_path(root, Path::new("../escape.txt")),
            Err(ToolError::Security(_))
        ));
        assert!(matches!(
            guard_path(root, Path::new("dir/../../escape.txt")),
            Err(ToolError::Security(_))
        ));
        assert!(matches!(
            guard_path(root, Path::new("/etc/passwd")),
            Err(ToolError::Security(_))
        ));
    }
}
