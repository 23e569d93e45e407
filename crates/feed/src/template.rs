//! Filename templating for archived episodes.
//!
//! Renders an [`EpisodeDescriptor`] through an [upon] template. Variables:
//!
//! | Variable    | Example                                  |
//! |-------------|------------------------------------------|
//! | `published` | `2024-03-05 10:00:00` (UTC)              |
//! | `prefix`    | `S03 E7 - `, `E7 - ` or empty            |
//! | `title`     | cleaned title                            |
//! | `identity`  | `00000000-0000-0000-0000-00007b000000`   |
//! | `extension` | `.mp3` (from the enclosure URL) or empty |
//! | `show`      | show name                                |
//! | `season`    | number, or empty when unknown            |
//! | `episode`   | number, or empty when unknown            |
//!
//! The result must be a single path component.

use crate::consts::DEFAULT_FILENAME_TEMPLATE;
use crate::error::{Error, ErrorKind, Result};
use crate::models::EpisodeDescriptor;
use crate::resolve::prefix;
use exn::ResultExt;
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use upon::{Engine, Template};

const PUBLISHED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub struct FilenameGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}

impl FromStr for FilenameGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let engine = Engine::new();
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}

impl Default for FilenameGenerator {
    fn default() -> Self {
        DEFAULT_FILENAME_TEMPLATE.parse().expect("default filename template compiles")
    }
}

impl FilenameGenerator {
    /// Render the filename for `descriptor`. Pure: the same descriptor always
    /// yields the same name.
    pub fn generate(&self, descriptor: &EpisodeDescriptor) -> Result<String> {
        let name = self
            .template
            .render(&self.engine, Self::parameters(descriptor)?)
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::validate(name)
    }

    fn validate(name: String) -> Result<String> {
        let name = name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            exn::bail!(ErrorKind::Template);
        }
        Ok(name.to_string())
    }

    fn parameters(descriptor: &EpisodeDescriptor) -> Result<upon::Value> {
        let published = descriptor.published.format(PUBLISHED_FORMAT).or_raise(|| ErrorKind::Template)?;
        Ok(upon::value! {
            published: published,
            prefix: prefix(descriptor),
            title: &descriptor.title,
            identity: descriptor.identity.as_str(),
            extension: descriptor.extension(),
            show: &descriptor.show,
            season: descriptor.has_season().then_some(descriptor.season),
            episode: descriptor.has_episode().then_some(descriptor.episode),
        })
    }
}
