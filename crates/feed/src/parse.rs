use crate::consts::{ATOM_LINK, CHANNEL, CHANNEL_TITLE, ENCLOSURE, IMAGE_URL, ITEM, ITUNES_IMAGE, RSS};
use crate::error::{ErrorKind, Result};
use crate::models::{Enclosure, Feed, FeedEntry};
use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::instrument;

/// Extract the channel metadata and every `<item>` from an RSS document.
///
/// Only structural problems (broken XML, a root that isn't `<rss>`) are
/// errors; missing fields are left as `None` for the resolver to judge.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut path: Vec<String> = Vec::new();
    let mut entry: Option<FeedEntry> = None;
    let mut seen_root = false;

    loop {
        let event = reader.read_event().or_raise(|| ErrorKind::Malformed)?;
        match event {
            Event::Start(e) => {
                let name = element_name(&e);
                if path.is_empty() {
                    if name != RSS {
                        exn::bail!(ErrorKind::Malformed);
                    }
                    seen_root = true;
                }
                visit_element(&e, &name, &path, &mut feed, entry.as_mut())?;
                if name == ITEM && at(&path, CHANNEL) {
                    entry = Some(FeedEntry::default());
                }
                path.push(name);
            },
            Event::Empty(e) => {
                let name = element_name(&e);
                if path.is_empty() {
                    exn::bail!(ErrorKind::Malformed);
                }
                visit_element(&e, &name, &path, &mut feed, entry.as_mut())?;
                if name == ITEM && at(&path, CHANNEL) {
                    feed.entries.push(FeedEntry::default());
                }
            },
            Event::End(_) => {
                let name = path.pop();
                if name.as_deref() == Some(ITEM) && at(&path, CHANNEL) {
                    feed.entries.extend(entry.take());
                }
            },
            Event::Text(t) => append_text(&path, &mut feed, entry.as_mut(), &text_of(&t)),
            Event::CData(c) => append_text(&path, &mut feed, entry.as_mut(), &String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {},
        }
    }

    if !seen_root {
        exn::bail!(ErrorKind::Malformed);
    }
    tracing::debug!(entries = feed.entries.len(), "parsed feed");
    Ok(feed)
}

pub(crate) fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

pub(crate) fn at(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

/// Unescaped text, falling back to the raw bytes for entities XML doesn't
/// define (feeds are full of `&nbsp;`).
pub(crate) fn text_of(t: &BytesText<'_>) -> String {
    t.unescape().map(|s| s.into_owned()).unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

pub(crate) fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.or_raise(|| ErrorKind::Malformed)?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().or_raise(|| ErrorKind::Malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Whether an `atom:link` is the feed's own URL.
pub(crate) fn is_self_link(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(e, "rel")?.is_none_or(|rel| rel == "self"))
}

fn visit_element(
    e: &BytesStart<'_>,
    name: &str,
    path: &[String],
    feed: &mut Feed,
    entry: Option<&mut FeedEntry>,
) -> Result<()> {
    if at(path, CHANNEL) {
        if name == ITUNES_IMAGE && feed.itunes_image.is_none() {
            feed.itunes_image = attribute(e, "href")?;
        } else if name == ATOM_LINK && feed.self_link.is_none() && is_self_link(e)? {
            feed.self_link = attribute(e, "href")?;
        }
    } else if name == ENCLOSURE
        && let Some(entry) = entry
        && entry.enclosure.is_none()
    {
        entry.enclosure = Some(Enclosure { url: attribute(e, "url")?, length: attribute(e, "length")? });
    }
    Ok(())
}

fn append_text(path: &[String], feed: &mut Feed, entry: Option<&mut FeedEntry>, text: &str) {
    let target = if at(path, CHANNEL_TITLE) {
        Some(&mut feed.title)
    } else if at(path, IMAGE_URL) {
        Some(&mut feed.image_url)
    } else if let Some(entry) = entry
        && path.len() == 4
    {
        match path[3].as_str() {
            "title" => Some(&mut entry.title),
            "guid" => Some(&mut entry.guid),
            "pubDate" => Some(&mut entry.pub_date),
            "itunes:episode" => Some(&mut entry.episode),
            "itunes:season" => Some(&mut entry.season),
            _ => None,
        }
    } else {
        None
    };
    if let Some(field) = target {
        field.get_or_insert_with(String::new).push_str(text);
    }
}
