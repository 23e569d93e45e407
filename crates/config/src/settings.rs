//! Layered runtime settings.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults ([`Settings::default`]).
//! 2. `podarc.toml` in the platform configuration directory.
//! 3. An explicit file passed on the command line (TOML, or JSON by extension).
//! 4. `PODARC_*` environment variables (`PODARC_CONCURRENCY=1`, ...).
//! 5. `PODCAST_ARCHIVER_PATH`, which only ever sets [`root`](Settings::root).

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ROOT_ENV_VAR: &str = "PODCAST_ARCHIVER_PATH";
const ENV_PREFIX: &str = "PODARC_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output root; holds `podcasts.json`, `archive/` and `logs/`.
    pub root: PathBuf,
    /// Worker width for downloads and uploads.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Show table overriding the embedded default.
    pub shows: Option<PathBuf>,
    /// Public download front-end of the remote store.
    pub remote_base: String,
    /// S3-like API front-end used to probe remote objects.
    pub remote_s3_base: String,
    pub upload_tool: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            concurrency: 8,
            timeout_secs: 15 * 60,
            user_agent: concat!("podarc/", env!("CARGO_PKG_VERSION")).to_string(),
            shows: None,
            remote_base: "https://archive.org/download".to_string(),
            remote_s3_base: "https://s3.us.archive.org".to_string(),
            upload_tool: "ia".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from every layer, with `explicit` sitting above the
    /// platform file and below the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dirs) = ProjectDirs::from("", "", "podarc") {
            figment = figment.merge(Toml::file(dirs.config_dir().join("podarc.toml")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX)).merge(
            Env::raw()
                .filter_map(|key| key.as_str().eq_ignore_ascii_case(ROOT_ENV_VAR).then(|| "root".into())),
        );
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let mut settings: Self = figment.extract().or_raise(|| ErrorKind::InvalidSettings)?;
        if settings.concurrency == 0 {
            tracing::warn!("concurrency of 0 requested, using 1");
            settings.concurrency = 1;
        }
        Ok(settings)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn podcasts_file(&self) -> PathBuf {
        self.root.join("podcasts.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
