//! Episode metadata resolution.
//!
//! A feed entry becomes an [`EpisodeDescriptor`] through a fixed sequence of
//! pure stages, each taking and returning a descriptor:
//!
//! 1. [`from_entry`]: structured fields (`itunes:season`/`itunes:episode`).
//! 2. [`apply_override`]: the show table's per-identity corrections.
//! 3. [`apply_patterns`]: the first matching title pattern is stripped from
//!    the title and fills any ordinal still unset. Ordinals the override
//!    set, including ones it cleared with `-1`, are left alone.
//! 4. [`clean`]: title normalization.
//!
//! The filename is then [`prefix`] plus the cleaned title, rendered through
//! a [`FilenameGenerator`].

mod title;

pub use self::title::clean_title;
use crate::error::{ErrorKind, Result};
use crate::identity::Identity;
use crate::models::{EpisodeDescriptor, FeedEntry, UNSET};
use crate::template::FilenameGenerator;
use exn::{OptionExt, ResultExt};
use podarc_config::{Override, ShowTable, TitlePattern};
use std::sync::Arc;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{Duration, OffsetDateTime, UtcDateTime};
use tracing::instrument;

/// A descriptor together with the filename it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub descriptor: EpisodeDescriptor,
    pub filename: String,
}

/// Turns feed entries into named episodes using one immutable [`ShowTable`].
#[derive(Clone)]
pub struct Resolver {
    table: Arc<ShowTable>,
    filenames: Arc<FilenameGenerator>,
}

impl Resolver {
    pub fn new(table: Arc<ShowTable>, filenames: FilenameGenerator) -> Self {
        Self { table, filenames: Arc::new(filenames) }
    }

    pub fn table(&self) -> &ShowTable {
        &self.table
    }

    /// Stages 1 through 4.
    pub fn describe(&self, show: &str, entry: &FeedEntry) -> Result<EpisodeDescriptor> {
        let descriptor = from_entry(show, entry)?;
        let correction = self.table.override_for(show, descriptor.identity.as_str());
        let descriptor = apply_override(descriptor, correction);
        let descriptor = apply_patterns(descriptor, self.table.patterns(show), correction);
        Ok(clean(descriptor))
    }

    #[instrument(level = "debug", skip_all, fields(show, guid = entry.guid.as_deref()))]
    pub fn resolve(&self, show: &str, entry: &FeedEntry) -> Result<Resolved> {
        let descriptor = self.describe(show, entry)?;
        let filename = self.filenames.generate(&descriptor)?;
        Ok(Resolved { descriptor, filename })
    }
}

fn required<'a>(value: Option<&'a String>, field: &'static str) -> Result<&'a str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).ok_or_raise(|| ErrorKind::MissingField(field))
}

fn ordinal(value: Option<&String>) -> i32 {
    value.and_then(|v| v.trim().parse::<i32>().ok()).filter(|n| *n >= 0).unwrap_or(UNSET)
}

pub(crate) fn parse_published(value: &str) -> Result<UtcDateTime> {
    let parsed = OffsetDateTime::parse(value, &Rfc2822).or_else(|_| OffsetDateTime::parse(value, &Rfc3339));
    parsed
        .map(OffsetDateTime::to_utc)
        .or_raise(|| ErrorKind::ParseError { field: "pubDate", value: value.to_string() })
}

/// Stage 1: required fields and whatever ordinals the feed declares.
pub fn from_entry(show: &str, entry: &FeedEntry) -> Result<EpisodeDescriptor> {
    let title = required(entry.title.as_ref(), "title")?;
    let guid = required(entry.guid.as_ref(), "guid")?;
    let identity = Identity::normalize(guid, title)?;
    let published = parse_published(required(entry.pub_date.as_ref(), "pubDate")?)?;
    let enclosure = entry.enclosure.as_ref();
    let enclosure_url = required(enclosure.and_then(|e| e.url.as_ref()), "enclosure url")?;
    let declared_length = enclosure
        .and_then(|e| e.length.as_deref())
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|l| *l >= 0)
        .unwrap_or(-1);

    Ok(EpisodeDescriptor {
        show: show.to_string(),
        identity,
        season: ordinal(entry.season.as_ref()),
        episode: ordinal(entry.episode.as_ref()),
        title: title.to_string(),
        published,
        enclosure_url: enclosure_url.to_string(),
        declared_length,
    })
}

/// Stage 2.
pub fn apply_override(mut descriptor: EpisodeDescriptor, correction: Option<&Override>) -> EpisodeDescriptor {
    let Some(correction) = correction else {
        return descriptor;
    };
    for fragment in correction.strip.iter().filter(|f| !f.is_empty()) {
        descriptor.title = descriptor.title.replace(fragment.as_str(), "");
    }
    if let Some(title) = &correction.title {
        descriptor.title = title.clone();
    }
    if let Some(prefix) = &correction.title_prefix {
        descriptor.title = format!("{prefix}{}", descriptor.title);
    }
    if let Some(suffix) = &correction.title_suffix {
        descriptor.title.push_str(suffix);
    }
    if let Some(season) = correction.season {
        descriptor.season = season.max(UNSET);
    }
    if let Some(episode) = correction.episode {
        descriptor.episode = episode.max(UNSET);
    }
    if let Some(shift) = correction.publish_shift {
        match descriptor.published.checked_add(Duration::seconds(shift)) {
            Some(shifted) => descriptor.published = shifted,
            None => tracing::warn!(identity = %descriptor.identity, shift, "publish shift out of range, ignored"),
        }
    }
    descriptor
}

/// Stage 3. `correction` is the override applied in stage 2, if any.
pub fn apply_patterns(
    mut descriptor: EpisodeDescriptor,
    patterns: &[TitlePattern],
    correction: Option<&Override>,
) -> EpisodeDescriptor {
    let Some(captures) = patterns.iter().find_map(|p| p.regex().captures(&descriptor.title)) else {
        return descriptor;
    };
    let number = |group: &str| captures.name(group).and_then(|m| m.as_str().parse::<i32>().ok());
    let episode = number("episode");
    let season = number("season");
    let matched = captures.get(0).map(|m| m.range()).unwrap_or_default();

    let mut stripped = descriptor.title.clone();
    stripped.replace_range(matched, " ");
    if !clean_title(&stripped).is_empty() {
        descriptor.title = stripped;
    }
    let forced_episode = correction.is_some_and(|c| c.episode.is_some());
    let forced_season = correction.is_some_and(|c| c.season.is_some());
    if !forced_episode
        && !descriptor.has_episode()
        && let Some(episode) = episode
    {
        descriptor.episode = episode;
    }
    if !forced_season
        && !descriptor.has_season()
        && let Some(season) = season
    {
        descriptor.season = season;
    }
    descriptor
}

/// Stage 4.
pub fn clean(mut descriptor: EpisodeDescriptor) -> EpisodeDescriptor {
    descriptor.title = clean_title(&descriptor.title);
    descriptor
}

/// `S03 E7 - `, `S03 - `, `E7 - `, or nothing.
pub fn prefix(descriptor: &EpisodeDescriptor) -> String {
    match (descriptor.has_season(), descriptor.has_episode()) {
        (true, true) => format!("S{:02} E{} - ", descriptor.season, descriptor.episode),
        (true, false) => format!("S{:02} - ", descriptor.season),
        (false, true) => format!("E{} - ", descriptor.episode),
        (false, false) => String::new(),
    }
}
