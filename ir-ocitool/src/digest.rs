use regex::Regex;
use sha2::{digest::DynDigest, Digest as Sha2Digest, Sha256, Sha512};
use std::{
    fmt::{Debug, Display},
    fs::File,
    io,
    path::Path,
    sync::OnceLock,
};

use crate::{error::ToolError, ToolResult};

pub const SHA256: &str = "sha256";
pub const SHA512: &str = "sha512";

const SHA256_LEN: usize = 64;
const SHA512_LEN: usize = 128;
const READ_BUF_SIZE: usize = 4096;

static DIGEST_REGEX: OnceLock<Regex> = OnceLock::new();

macro_rules! err {
    ($($arg:tt)+) => (Err(ToolError::Format(format!($($arg)+))))
}

/// Content digest in the `algo:hex` form used by manifests and configs.
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct Digest
{
    algo: String,
    hash: String,
}

impl Display for Digest
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        <Self as Debug>::fmt(self, f)
    }
}

impl Debug for Digest
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}:{}", self.algo, self.hash)
    }
}

impl TryFrom<&str> for Digest
{
    type Error = ToolError;

    fn try_from(value: &str) -> Result<Self, Self::Error>
    {
        let re = Self::regex()?;
        let Some(captures) = re.captures(value) else {
            return err!("Not a digest: \"{}\"", value);
        };

        let (_, [algo, hash]) = captures.extract();
        Self::new(algo.to_string(), hash.to_string())
    }
}

impl TryFrom<&String> for Digest
{
    type Error = ToolError;

    fn try_from(value: &String) -> Result<Self, Self::Error>
    {
        Digest::try_from(value as &str)
    }
}

impl From<Digest> for String
{
    fn from(value: Digest) -> Self
    {
        value.algo + ":" + &value.hash
    }
}

impl Digest
{
    const REGEX: &'static str = r"^([a-z0-9]+(?:[+._-][a-z0-9]+)*):([a-zA-Z0-9=_-]+)$";

    fn regex() -> ToolResult<&'static Regex>
    {
        if let Some(re) = DIGEST_REGEX.get() {
            return Ok(re);
        }
        let re = Regex::new(Self::REGEX).or(err!("Malformed digest regex"))?;
        Ok(DIGEST_REGEX.get_or_init(|| re))
    }

    pub fn new(algo: String, hash: String) -> ToolResult<Self>
    {
        let hash_len = hash.len();
        match algo.as_str() {
            SHA256 => {
                if hash_len != SHA256_LEN {
                    err!("Wrong hash length: {}, expected: {}", hash_len, SHA256_LEN)?;
                }
            }
            SHA512 => {
                if hash_len != SHA512_LEN {
                    err!("Wrong hash length: {}, expected: {}", hash_len, SHA512_LEN)?;
                }
            }
            a => err!("Wrong hash algorithm: {}", a)?,
        }

        // blob files are named after the hash, only lowercase hex is accepted
        if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            err!("Incorrect hash string: {}", hash)?;
        }

        Ok(Digest { algo, hash })
    }

    pub fn algo(&self) -> &str
    {
        &self.algo
    }

    pub fn hash(&self) -> &str
    {
        &self.hash
    }

    /// Name of the blob file holding this content in a directory-format image
    pub fn file_name(&self) -> &str
    {
        &self.hash
    }

    pub fn from_reader<T: io::Read>(algo: &str, reader: &mut T) -> ToolResult<Self>
    {
        let mut hasher: Box<dyn DynDigest> = match algo {
            SHA256 => Box::new(Sha256::new()),
            SHA512 => Box::new(Sha512::new()),
            a => err!("Wrong hash algorithm: {}", a)?,
        };

        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = reader.read(buf.as_mut_slice())?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[0..n]);
        }

        Ok(Digest {
            algo: algo.to_string(),
            hash: hex::encode(hasher.finalize()),
        })
    }

    pub fn sha256_file<P: AsRef<Path>>(path: P) -> ToolResult<Self>
    {
        let mut file = File::open(path)?;
        Self::from_reader(SHA256, &mut file)
    }

    /// Rehash the file with this digest's algorithm and compare
    pub fn verify_file<P: AsRef<Path>>(&self, path: P) -> ToolResult<bool>
    {
        let mut file = File::open(path)?;
        Ok(Self::from_reader(&self.algo, &mut file)? == *self)
    }
}
