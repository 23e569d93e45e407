//! Credentials for the remote store's S3-like API.
//!
//! Environment variables win; otherwise the `[s3]` section of the upload
//! tool's own `ia.ini` is read.

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::{OptionExt, ResultExt};
use regex::Regex;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const ACCESS_ENV_VAR: &str = "IAS3_ACCESS_KEY";
const SECRET_ENV_VAR: &str = "IAS3_SECRET_KEY";
const CONFIG_FILE_ENV_VAR: &str = "IA_CONFIG_FILE";

static S3_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[s3\]\r?\naccess\s*=\s*(?<access>[^\r\n]*)\r?\nsecret\s*=\s*(?<secret>[^\r\n]*)")
        .expect("valid credentials regex")
});

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access: String,
    secret: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials").field("access", &self.access).field("secret", &"<redacted>").finish()
    }
}

impl Credentials {
    /// Returns `None` if either half is blank.
    pub fn new(access: impl Into<String>, secret: impl Into<String>) -> Option<Self> {
        let (access, secret) = (access.into().trim().to_string(), secret.into().trim().to_string());
        (!access.is_empty() && !secret.is_empty()).then_some(Self { access, secret })
    }

    pub fn discover() -> Result<Self> {
        Self::discover_with(|key| std::env::var(key).ok(), Self::default_config_file())
    }

    fn discover_with(env: impl Fn(&str) -> Option<String>, default_file: Option<PathBuf>) -> Result<Self> {
        if let Some(credentials) = env(ACCESS_ENV_VAR).zip(env(SECRET_ENV_VAR)).and_then(|(a, s)| Self::new(a, s)) {
            return Ok(credentials);
        }
        let file = env(CONFIG_FILE_ENV_VAR).filter(|f| !f.is_empty()).map(PathBuf::from).or(default_file);
        let file = file.filter(|f| f.is_file()).ok_or_raise(|| ErrorKind::MissingCredentials)?;
        Self::from_config_file(&file)
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).or_raise(|| ErrorKind::Io)?;
        let credentials = Self::from_ini(&text);
        if credentials.is_none() {
            tracing::error!(
                path = %path.display(),
                "could not find an [s3] section with access and secret keys on consecutive lines"
            );
        }
        credentials.ok_or_raise(|| ErrorKind::MissingCredentials)
    }

    pub fn from_ini(text: &str) -> Option<Self> {
        let captures = S3_SECTION.captures(text)?;
        Self::new(&captures["access"], &captures["secret"])
    }

    fn default_config_file() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(".config").join("internetarchive").join("ia.ini"))
    }

    /// Value of the `authorization` header for the S3-like API.
    pub fn authorization(&self) -> String {
        format!("LOW {}:{}", self.access, self.secret)
    }
}
