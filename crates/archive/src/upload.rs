//! Handing files to the external upload tool.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::instrument;

/// Puts one local file into a remote item.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, identifier: &str, file: &Path) -> Result<()>;
}

/// The Internet Archive command-line tool (`ia upload {identifier} {file}`).
#[derive(Debug, Clone)]
pub struct IaUploader {
    program: PathBuf,
}

impl IaUploader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Find `tool` on `PATH` and make sure `{tool} --version` succeeds.
    pub async fn probe(tool: &str) -> Result<Self> {
        let program = which::which(tool).or_raise(|| ErrorKind::ToolUnavailable(tool.to_string()))?;
        let output = Command::new(&program)
            .arg("--version")
            .output()
            .await
            .or_raise(|| ErrorKind::ToolUnavailable(tool.to_string()))?;
        if !output.status.success() {
            exn::bail!(ErrorKind::ToolUnavailable(tool.to_string()));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        tracing::info!(tool = %program.display(), version = %version.trim(), "found upload tool");
        Ok(Self { program })
    }
}

#[async_trait]
impl Uploader for IaUploader {
    #[instrument(skip(self), fields(file = %file.display()))]
    async fn upload(&self, identifier: &str, file: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("upload")
            .arg(identifier)
            .arg(file)
            .kill_on_drop(true)
            .output()
            .await
            .or_raise(|| ErrorKind::Upload(file.display().to_string()))?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(status = %output.status, stdout = %stdout.trim(), stderr = %stderr.trim(), "upload tool failed");
            exn::bail!(ErrorKind::Upload(file.display().to_string()));
        }
        Ok(())
    }
}
