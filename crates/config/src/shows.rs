//! Per-show resolution policy.
//!
//! Upstream feeds carry a long tail of data-quality defects: missing or wrong
//! ordinals, duplicated episode numbers, misnamed bonus episodes. Rather than
//! hard-coding a branch per show, everything lives in a TOML table that is
//! loaded once into an immutable [`ShowTable`]:
//!
//! ```toml
//! [defaults]
//! patterns = ['\s*#(?<episode>\d+)\s*$']
//!
//! [shows."Black Box Down (FIRST Member Ad-Free)"]
//! tolerate_length_mismatch = true
//!
//! [shows."Red Web (FIRST Member Ad-Free)".overrides."00000000-0000-0000-0000-00007b000000"]
//! episode = 5
//! title_prefix = "Bonus - "
//! ```
//!
//! A show without its own `patterns` uses the defaults'. Override keys are
//! episode identities and are matched case-insensitively.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Format, Toml};
use regex::Regex;
use rust_embed::Embed;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const BUILTIN_TABLE: &str = "shows.toml";

#[derive(Embed)]
#[folder = "assets/"]
struct Builtins;

/// A title regex with a named `episode` group and an optional `season` group.
#[derive(Debug, Clone)]
pub struct TitlePattern(Regex);
impl TitlePattern {
    pub fn new(pattern: &str) -> std::result::Result<Self, String> {
        let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
        if !regex.capture_names().flatten().any(|name| name == "episode") {
            return Err(format!("pattern {pattern:?} has no named `episode` group"));
        }
        Ok(Self(regex))
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}
impl<'de> Deserialize<'de> for TitlePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::new(&pattern).map_err(serde::de::Error::custom)
    }
}
impl PartialEq for TitlePattern {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

/// Corrections for a single episode. Applied in field order: `strip`, then
/// `title`, then `title_prefix`/`title_suffix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Override {
    /// Forced season; `-1` clears it.
    pub season: Option<i32>,
    /// Forced episode; `-1` clears it.
    pub episode: Option<i32>,
    /// Replacement title.
    pub title: Option<String>,
    pub title_prefix: Option<String>,
    pub title_suffix: Option<String>,
    /// Substrings removed from the title.
    pub strip: Vec<String>,
    /// Seconds added to the publish timestamp (negative moves it earlier).
    pub publish_shift: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowPolicy {
    pub tolerate_length_mismatch: bool,
    pub patterns: Vec<TitlePattern>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDefaults {
    tolerate_length_mismatch: bool,
    patterns: Vec<TitlePattern>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawShow {
    tolerate_length_mismatch: Option<bool>,
    patterns: Option<Vec<TitlePattern>>,
    overrides: BTreeMap<String, Override>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTable {
    defaults: RawDefaults,
    shows: BTreeMap<String, RawShow>,
}

#[derive(Debug, Clone, Default)]
pub struct ShowTable {
    defaults: ShowPolicy,
    shows: HashMap<String, ShowPolicy>,
    overrides: HashMap<String, Override>,
}

impl ShowTable {
    /// Load the table at `path`, or the built-in table when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let text = match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                std::fs::read_to_string(path).or_raise(|| ErrorKind::Io)?
            },
            None => {
                let file = Builtins::get(BUILTIN_TABLE)
                    .ok_or_raise(|| ErrorKind::AssetNotFound(BUILTIN_TABLE.to_string()))?;
                String::from_utf8_lossy(&file.data).into_owned()
            },
        };
        let table = Self::from_toml(&text)?;
        tracing::debug!(shows = table.shows.len(), overrides = table.overrides.len(), "loaded show table");
        Ok(table)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let raw: RawTable = Figment::from(Toml::string(text)).extract().or_raise(|| ErrorKind::InvalidShowTable)?;
        let defaults = ShowPolicy {
            tolerate_length_mismatch: raw.defaults.tolerate_length_mismatch,
            patterns: raw.defaults.patterns,
        };
        let mut shows = HashMap::with_capacity(raw.shows.len());
        let mut overrides = HashMap::new();
        for (name, show) in raw.shows {
            for (identity, correction) in show.overrides {
                overrides.insert(Self::key(&name, &identity), correction);
            }
            let policy = ShowPolicy {
                tolerate_length_mismatch: show.tolerate_length_mismatch.unwrap_or(defaults.tolerate_length_mismatch),
                patterns: show.patterns.unwrap_or_else(|| defaults.patterns.clone()),
            };
            shows.insert(name, policy);
        }
        Ok(Self { defaults, shows, overrides })
    }

    fn key(show: &str, identity: &str) -> String {
        format!("{show}_{}", identity.trim().to_lowercase())
    }

    pub fn policy(&self, show: &str) -> &ShowPolicy {
        self.shows.get(show).unwrap_or(&self.defaults)
    }

    pub fn tolerates_length_mismatch(&self, show: &str) -> bool {
        self.policy(show).tolerate_length_mismatch
    }

    pub fn patterns(&self, show: &str) -> &[TitlePattern] {
        &self.policy(show).patterns
    }

    pub fn override_for(&self, show: &str, identity: &str) -> Option<&Override> {
        self.overrides.get(&Self::key(show, identity))
    }
}
