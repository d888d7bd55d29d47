use log::{debug, error, info};
use std::fmt::Display;
use std::path::PathBuf;
use std::process::Command;

use crate::{error::ToolError, ToolResult};

/// Exit code reported when the transport binary could not be started
pub const SPAWN_FAILED: i32 = 127;

/// Either side of a copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location
{
    /// Directory-format image on the local filesystem
    Dir(PathBuf),
    /// Image reference in a remote registry, passed through untouched
    Docker(String),
}

impl Display for Location
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self {
            Location::Dir(path) => write!(f, "dir:{}", path.display()),
            Location::Docker(reference) => write!(f, "docker://{}", reference),
        }
    }
}

pub trait Transport
{
    fn copy(&self, src: &Location, dst: &Location) -> ToolResult<()>;
}

/// Registry transport backed by `skopeo copy`
#[derive(Debug, Clone)]
pub struct Skopeo
{
    binary: String,
    args: Vec<String>,
}

impl Skopeo
{
    pub fn new<S: Into<String>>(binary: S) -> Self
    {
        Self {
            binary: binary.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed between `copy` and the locations
    pub fn args(mut self, args: Vec<String>) -> Self
    {
        self.args = args;
        self
    }

    fn command(&self, src: &Location, dst: &Location) -> Command
    {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("copy")
            .args(&self.args)
            .arg(src.to_string())
            .arg(dst.to_string());
        cmd
    }
}

impl Transport for Skopeo
{
    fn copy(&self, src: &Location, dst: &Location) -> ToolResult<()>
    {
        info!("Running: {} copy {} {}", self.binary, src, dst);

        let output = self.command(src, dst).output().map_err(|e| {
            error!("Failed to run \"{}\": {}", self.binary, e);
            ToolError::Transport {
                code: SPAWN_FAILED,
                message: format!("Failed to run \"{}\": {}", self.binary, e),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}", stdout.trim());
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(1);
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Transport failed with code {}: {}", code, message);
            return Err(ToolError::Transport { code, message });
        }

        Ok(())
    }
}
