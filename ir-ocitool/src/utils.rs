use std::path::Path;
use std::{fs::File, io::Write};

use crate::{error::ToolError, ToolResult};

pub fn file_write<T: AsRef<Path>>(filename: T, data: &[u8]) -> std::io::Result<()>
{
    let mut file = File::create(filename)?;
    file.write_all(data)?;
    file.sync_all()
}

pub fn file_len<T: AsRef<Path>>(filename: T) -> std::io::Result<u64>
{
    Ok(std::fs::metadata(filename)?.len())
}

/// Last path component as UTF-8, the name a file gets inside a layer
pub fn base_name<T: AsRef<Path>>(path: T) -> ToolResult<String>
{
    let path = path.as_ref();
    let name = path
        .file_name()
        .ok_or_else(|| ToolError::Input(format!("No file name in \"{}\"", path.display())))?;

    name.to_str()
        .map(str::to_string)
        .ok_or_else(|| ToolError::Input(format!("Non UTF-8 file name: \"{}\"", path.display())))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn base_name_strips_directories()
    {
        assert_eq!(base_name("/tmp/some/dir/a.txt").unwrap(), "a.txt");
        assert_eq!(base_name("b.bin").unwrap(), "b.bin");
        assert!(matches!(base_name("/"), Err(ToolError::Input(_))));
        assert!(matches!(base_name("dir/.."), Err(ToolError::Input(_))));
    }

    #[test]
    fn write_and_len()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");

        file_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(file_len(&path).unwrap(), 5);
    }
}
