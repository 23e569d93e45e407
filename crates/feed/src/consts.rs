use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(WHITESPACE_REGEX, r"\s+");
regex!(SPACED_SLASH_REGEX, r"\s+/\s+");

pub(crate) const RSS: &str = "rss";
pub(crate) const CHANNEL: &[&str] = &["rss", "channel"];
pub(crate) const ITEM: &str = "item";
pub(crate) const IMAGE_URL: &[&str] = &["rss", "channel", "image", "url"];
pub(crate) const CHANNEL_TITLE: &[&str] = &["rss", "channel", "title"];
pub(crate) const ITUNES_IMAGE: &str = "itunes:image";
pub(crate) const ATOM_LINK: &str = "atom:link";
pub(crate) const ENCLOSURE: &str = "enclosure";

/// Default filename template; see [`crate::FilenameGenerator`].
pub const DEFAULT_FILENAME_TEMPLATE: &str =
    "{{ published }} - {{ prefix }}{{ title }} ({{ identity }}){{ extension }}";
