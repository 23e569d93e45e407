//! Rewrites a feed snapshot so that it points at the remote mirror.
//!
//! The document is streamed event by event and written back out unchanged
//! except for:
//!
//! - the channel's self `atom:link` and `itunes:image` hrefs, and the
//!   `image/url` text, and
//! - each item's enclosure `url` and `length`, looked up by identity.
//!
//! Items are buffered until `</item>` since the `<guid>` can come after the
//! `<enclosure>`.

use crate::consts::{ATOM_LINK, CHANNEL, ENCLOSURE, IMAGE_URL, ITEM, ITUNES_IMAGE};
use crate::error::{ErrorKind, Result};
use crate::identity::Identity;
use crate::parse::{at, element_name, is_self_link, text_of};
use exn::ResultExt;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use tracing::instrument;

/// Where an episode lives remotely, and its true size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnclosure {
    pub url: String,
    /// `-1` when unknown; such episodes are left untouched.
    pub length: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Rewrite<'a> {
    pub feed_url: &'a str,
    pub cover_url: Option<&'a str>,
    pub enclosures: &'a HashMap<Identity, RemoteEnclosure>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    /// Guid (or title) of every item left pointing at the origin.
    pub skipped: Vec<String>,
}

#[derive(Default)]
struct ItemState<'a> {
    events: Vec<Event<'a>>,
    guid: String,
    title: String,
}

#[instrument(skip_all, fields(feed_url = rewrite.feed_url))]
pub fn rewrite_feed(bytes: &[u8], rewrite: &Rewrite<'_>) -> Result<(Vec<u8>, RewriteReport)> {
    let mut reader = Reader::from_reader(bytes);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut report = RewriteReport::default();
    let mut path: Vec<String> = Vec::new();
    let mut item: Option<ItemState<'_>> = None;
    // Only the first text node of `image/url` is replaced.
    let mut cover_written = false;

    loop {
        let event = reader.read_event().or_raise(|| ErrorKind::Malformed)?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = element_name(&e);
                let at_channel = at(&path, CHANNEL);
                path.push(name.clone());
                if name == ITEM && at_channel {
                    item = Some(ItemState::default());
                }
                if at(&path, IMAGE_URL) {
                    cover_written = false;
                }
                if at_channel { Event::Start(channel_element(e, &name, rewrite)?) } else { Event::Start(e) }
            },
            Event::Empty(e) if at(&path, CHANNEL) => {
                let name = element_name(&e);
                Event::Empty(channel_element(e, &name, rewrite)?)
            },
            Event::End(e) => {
                let name = path.pop();
                if name.as_deref() == Some(ITEM)
                    && at(&path, CHANNEL)
                    && let Some(mut state) = item.take()
                {
                    state.events.push(Event::End(e));
                    flush_item(&mut writer, state, rewrite, &mut report)?;
                    continue;
                }
                Event::End(e)
            },
            Event::Text(t) => {
                if let Some(state) = item.as_mut() {
                    collect(state, &path, &text_of(&t));
                }
                match (at(&path, IMAGE_URL), rewrite.cover_url) {
                    (true, Some(_)) if cover_written => continue,
                    (true, Some(cover)) if !t.iter().all(u8::is_ascii_whitespace) => {
                        cover_written = true;
                        Event::Text(BytesText::new(cover).into_owned())
                    },
                    _ => Event::Text(t),
                }
            },
            Event::CData(c) => {
                if let Some(state) = item.as_mut() {
                    collect(state, &path, &String::from_utf8_lossy(&c));
                }
                match (at(&path, IMAGE_URL), rewrite.cover_url) {
                    (true, Some(_)) if cover_written => continue,
                    (true, Some(cover)) => {
                        cover_written = true;
                        Event::Text(BytesText::new(cover).into_owned())
                    },
                    _ => Event::CData(c),
                }
            },
            other => other,
        };
        match item.as_mut() {
            Some(state) => state.events.push(event),
            None => writer.write_event(event).or_raise(|| ErrorKind::Malformed)?,
        }
    }

    tracing::debug!(rewritten = report.rewritten, skipped = report.skipped.len(), "rewrote feed");
    Ok((writer.into_inner(), report))
}

fn collect(state: &mut ItemState<'_>, path: &[String], text: &str) {
    if path.len() == 4 {
        match path[3].as_str() {
            "guid" => state.guid.push_str(text),
            "title" => state.title.push_str(text),
            _ => {},
        }
    }
}

/// Copy `e`, replacing the values of the given attributes (and appending any
/// that were missing).
fn with_attributes(e: &BytesStart<'_>, name: &str, replacements: &[(&str, &str)]) -> Result<BytesStart<'static>> {
    let mut out = BytesStart::new(name.to_string());
    let mut seen = vec![false; replacements.len()];
    for attr in e.attributes() {
        let attr = attr.or_raise(|| ErrorKind::Malformed)?;
        match replacements.iter().position(|(key, _)| key.as_bytes() == attr.key.as_ref()) {
            Some(idx) => {
                seen[idx] = true;
                out.push_attribute(replacements[idx]);
            },
            None => out.push_attribute(attr),
        }
    }
    for (idx, _) in seen.iter().enumerate().filter(|(_, seen)| !**seen) {
        out.push_attribute(replacements[idx]);
    }
    Ok(out)
}

fn channel_element<'a>(e: BytesStart<'a>, name: &str, rewrite: &Rewrite<'_>) -> Result<BytesStart<'a>> {
    if name == ATOM_LINK && is_self_link(&e)? {
        return with_attributes(&e, name, &[("href", rewrite.feed_url)]);
    }
    if name == ITUNES_IMAGE
        && let Some(cover) = rewrite.cover_url
    {
        return with_attributes(&e, name, &[("href", cover)]);
    }
    Ok(e)
}

fn flush_item(
    writer: &mut Writer<Vec<u8>>,
    state: ItemState<'_>,
    rewrite: &Rewrite<'_>,
    report: &mut RewriteReport,
) -> Result<()> {
    let label = if state.guid.trim().is_empty() { state.title.trim() } else { state.guid.trim() };
    let target = Identity::normalize(state.guid.trim(), state.title.trim())
        .ok()
        .and_then(|identity| rewrite.enclosures.get(&identity))
        .filter(|remote| remote.length >= 0);
    match target {
        Some(_) => report.rewritten += 1,
        None => {
            tracing::warn!(item = label, "no uploaded copy with a known length, leaving enclosure untouched");
            report.skipped.push(label.to_string());
        },
    }

    let replacements = target.map(|remote| (remote.url.as_str(), remote.length.to_string()));
    let replacements = replacements.as_ref().map(|(url, length)| [("url", *url), ("length", length.as_str())]);
    let mut depth = 0usize;
    for event in state.events {
        let event = match (event, &replacements) {
            (Event::Start(e), Some(attrs)) if depth == 1 && element_name(&e) == ENCLOSURE => {
                Event::Start(with_attributes(&e, ENCLOSURE, attrs)?)
            },
            (Event::Empty(e), Some(attrs)) if depth == 1 && element_name(&e) == ENCLOSURE => {
                Event::Empty(with_attributes(&e, ENCLOSURE, attrs)?)
            },
            (event, _) => event,
        };
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {},
        }
        writer.write_event(event).or_raise(|| ErrorKind::Malformed)?;
    }
    Ok(())
}
