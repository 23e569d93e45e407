use crate::identity::Identity;
use time::UtcDateTime;

/// Sentinel for an absent ordinal or length.
pub const UNSET: i32 = -1;

/// Everything needed to name and fetch one episode. Recomputed on every run
/// from the feed and the show table, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeDescriptor {
    pub show: String,
    pub identity: Identity,
    /// [`UNSET`] when unknown.
    pub season: i32,
    /// [`UNSET`] when unknown.
    pub episode: i32,
    pub title: String,
    pub published: UtcDateTime,
    pub enclosure_url: String,
    /// Declared enclosure byte length, `-1` when the feed omits it.
    pub declared_length: i64,
}

impl EpisodeDescriptor {
    pub fn has_season(&self) -> bool {
        self.season >= 0
    }

    pub fn has_episode(&self) -> bool {
        self.episode >= 0
    }

    /// Ledger and override key: `{show}_{identity}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.show, self.identity)
    }

    /// Dotted extension of the enclosure's URL path, or empty.
    pub fn extension(&self) -> String {
        let path = url::Url::parse(&self.enclosure_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.enclosure_url.split(['?', '#']).next().unwrap_or_default().to_string());
        let last = path.rsplit('/').next().unwrap_or_default();
        match last.rfind('.') {
            Some(idx) if idx + 1 < last.len() => last[idx..].to_string(),
            _ => String::new(),
        }
    }
}
