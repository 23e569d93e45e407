use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Show names written into a freshly generated `podcasts.json`.
pub const KNOWN_SHOWS: &[&str] = &[
    "Always Open (FIRST Member Ad-Free)",
    "Annual Pass (FIRST Member Ad-Free)",
    "Black Box Down (FIRST Member Ad-Free)",
    "Dogbark (FIRST Member Ad-Free)",
    "F**kface (FIRST Member Ad-Free)",
    "Face Jam (FIRST Member Ad-Free)",
    "Funhaus Podcast (FIRST Member Ad-Free)",
    "Good Morning From Hell (FIRST Member Ad-Free)",
    "Off Topic (FIRST Member Ad-Free)",
    "Red Web (FIRST Member Ad-Free)",
    "Rooster Teeth Podcast (FIRST Member Ad-Free)",
    "Ship Hits The Fan (FIRST Member Ad-Free)",
    "So... Alright (FIRST Member Ad-Free)",
    "Tales from the Stinky Dragon (FIRST Member Ad-Free)",
];

/// One entry of `podcasts.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Identifier of the remote item this show is mirrored to.
    #[serde(default)]
    pub ia_identifier: String,
    #[serde(default)]
    pub enabled: bool,
}
impl Podcast {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), url: String::new(), ia_identifier: String::new(), enabled: true }
    }

    /// Whether the archiver should touch this show at all.
    pub fn is_archivable(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Podcasts(Vec<Podcast>);

#[derive(Debug)]
pub enum Loaded {
    Existing(Podcasts),
    /// No list existed; a template was written here for the operator to fill in.
    TemplateCreated(PathBuf),
}

impl Podcasts {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).or_raise(|| ErrorKind::Io)?;
        let list = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidPodcasts(path.to_path_buf()))?;
        Ok(Self(list))
    }

    /// Read the podcast list, or write a template of [`KNOWN_SHOWS`] if none
    /// exists yet.
    pub fn load_or_template(path: impl AsRef<Path>) -> Result<Loaded> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path).map(Loaded::Existing);
        }
        let template: Vec<Podcast> = KNOWN_SHOWS.iter().copied().map(Podcast::new).collect();
        let json = serde_json::to_vec_pretty(&template).or_raise(|| ErrorKind::Io)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
        }
        fs::write(path, json).or_raise(|| ErrorKind::Io)?;
        tracing::info!(path = %path.display(), shows = template.len(), "wrote podcast list template");
        Ok(Loaded::TemplateCreated(path.to_path_buf()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Podcast> {
        self.0.iter()
    }

    /// Restrict to a single show by exact name.
    pub fn only(self, name: Option<&str>) -> Self {
        match name {
            Some(name) => Self(self.0.into_iter().filter(|p| p.name == name).collect()),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Podcast>> for Podcasts {
    fn from(list: Vec<Podcast>) -> Self {
        Self(list)
    }
}
