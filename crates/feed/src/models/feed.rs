/// The parts of an RSS document the archiver cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: Option<String>,
    /// `/rss/channel/image/url`
    pub image_url: Option<String>,
    /// `/rss/channel/itunes:image/@href`
    pub itunes_image: Option<String>,
    /// `/rss/channel/atom:link[@rel='self']/@href`
    pub self_link: Option<String>,
    /// Items in document order (newest first, for every feed seen so far).
    pub entries: Vec<FeedEntry>,
}

impl Feed {
    /// Entries oldest-first.
    pub fn chronological(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter().rev()
    }
}

/// One `<item>`, untouched beyond XML unescaping. Every field is optional
/// because real feeds omit all of them at some point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    /// `itunes:episode`
    pub episode: Option<String>,
    /// `itunes:season`
    pub season: Option<String>,
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: Option<String>,
    pub length: Option<String>,
}
