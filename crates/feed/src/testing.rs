//! Shared fixtures for unit tests.

pub(crate) const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Sample &amp; Show</title>
    <atom:link href="https://feeds.example.com/sample.rss" rel="self" type="application/rss+xml"/>
    <itunes:image href="https://img.example.com/cover.jpg?w=300"/>
    <image>
      <url>https://img.example.com/cover.jpg?w=300</url>
      <title>Sample</title>
    </image>
    <item>
      <title><![CDATA[Newest: The "Finale" #12]]></title>
      <guid isPermaLink="false">2B1E6C3A-5F4D-4E7B-9A8C-0D1E2F3A4B5C</guid>
      <pubDate>Tue, 05 Mar 2024 10:00:00 +0000</pubDate>
      <itunes:season>3</itunes:season>
      <itunes:episode>12</itunes:episode>
      <itunes:image href="https://img.example.com/episode.jpg"/>
      <enclosure url="https://cdn.example.com/ep12.mp3?src=rss" length="1000" type="audio/mpeg"/>
    </item>
    <item>
      <title>Oldest</title>
      <guid>123</guid>
      <pubDate>Mon, 01 Jan 2018 08:30:00 GMT</pubDate>
      <enclosure url="https://cdn.example.com/old.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;
