//! Remote channel feeds over HTTP.
//!
//! YouTube publishes an Atom feed per channel; Bilibili users are read
//! through an RSSHub instance. Both are parsed with feed-rs.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_rs::model::{Entry, Feed};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use super::FeedSource;
use crate::domain::{Platform, RemoteEntry, RemoteFeed, RemoteFeedMeta, YOUTUBE_URL};

const YOUTUBE_ID_PREFIX: &str = "yt:video:";

/// Errors that can occur when fetching a remote feed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),
}

/// Feed source backed by reqwest + feed-rs
pub struct HttpFeedSource {
    client: reqwest::Client,
    rsshub_url: String,
    youtube_base: String,
}

impl HttpFeedSource {
    pub fn new(rsshub_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("podsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            rsshub_url: rsshub_url.into(),
            youtube_base: YOUTUBE_URL.to_string(),
        })
    }

    /// Point YouTube requests at another host (tests)
    pub fn with_youtube_base(mut self, base: impl Into<String>) -> Self {
        self.youtube_base = base.into();
        self
    }

    pub fn feed_url(&self, platform: Platform, channel_id: &str) -> String {
        platform.feed_url(channel_id, &self.youtube_base, &self.rsshub_url)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(platform = %platform))]
    async fn fetch(&self, platform: Platform, channel_id: &str) -> Result<RemoteFeed> {
        let url = self.feed_url(platform, channel_id);
        debug!(url = %url, "Fetching remote feed");

        let bytes = self
            .get_bytes(&url)
            .await
            .with_context(|| format!("Failed to fetch feed: {}", url))?;

        let feed = parse_remote_feed(platform, &bytes)
            .with_context(|| format!("Failed to parse feed: {}", url))?;
        debug!(entries = feed.entries.len(), "Fetched remote feed");
        Ok(feed)
    }
}

/// Parse raw feed bytes into a [`RemoteFeed`]
pub fn parse_remote_feed(platform: Platform, bytes: &[u8]) -> Result<RemoteFeed, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(convert_feed(platform, feed))
}

fn convert_feed(platform: Platform, feed: Feed) -> RemoteFeed {
    let meta = RemoteFeedMeta {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        link: feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| feed.links.first())
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        author: feed.authors.first().map(|a| a.name.clone()),
        published: feed.published.or(feed.updated),
    };

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| convert_entry(platform, entry))
        .collect();

    RemoteFeed { meta, entries }
}

fn convert_entry(platform: Platform, entry: Entry) -> Option<RemoteEntry> {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let id = match platform {
        Platform::Youtube => youtube_video_id(&entry.id),
        Platform::Bilibili => bilibili_video_id(&link),
    };
    if id.is_empty() {
        debug!(entry_id = %entry.id, link = %link, "Skipping entry without a usable ID");
        return None;
    }

    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
        })
        .unwrap_or_default();

    let thumbnail_url = match platform {
        Platform::Youtube => entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .next(),
        Platform::Bilibili => cover_from_summary(&summary),
    };

    Some(RemoteEntry {
        id,
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        link,
        published_at: entry.published.or(entry.updated),
        summary,
        thumbnail_url,
    })
}

/// Video ID from a YouTube Atom entry ID (`yt:video:<id>`)
pub fn youtube_video_id(entry_id: &str) -> String {
    entry_id
        .strip_prefix(YOUTUBE_ID_PREFIX)
        .unwrap_or(entry_id)
        .to_string()
}

/// Video ID from a Bilibili link: the last path segment without extension
pub fn bilibili_video_id(link: &str) -> String {
    let path = match url::Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.to_string(),
    };
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match segment.rfind('.') {
        Some(pos) if pos > 0 => segment[..pos].to_string(),
        _ => segment.to_string(),
    }
}

/// First `<img src="...">` URL embedded in an HTML summary
pub fn cover_from_summary(summary: &str) -> Option<String> {
    static IMG_SRC: OnceLock<Option<Regex>> = OnceLock::new();
    IMG_SRC
        .get_or_init(|| Regex::new(r#"img src="([^"]*)""#).ok())
        .as_ref()?
        .captures(summary)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YOUTUBE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <link rel="self" href="http://www.youtube.com/feeds/videos.xml?channel_id=UC1"/>
 <id>yt:channel:UC1</id>
 <yt:channelId>UC1</yt:channelId>
 <title>Test Channel</title>
 <link rel="alternate" href="https://www.youtube.com/channel/UC1"/>
 <author><name>Test Channel</name><uri>https://www.youtube.com/channel/UC1</uri></author>
 <published>2020-01-01T00:00:00+00:00</published>
 <entry>
  <id>yt:video:NEW</id>
  <yt:videoId>NEW</yt:videoId>
  <title>Newest</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=NEW"/>
  <published>2024-02-02T10:00:00+00:00</published>
  <updated>2024-02-02T11:00:00+00:00</updated>
  <media:group>
   <media:title>Newest</media:title>
   <media:thumbnail url="https://i.ytimg.com/vi/NEW/hqdefault.jpg" width="480" height="360"/>
   <media:description>About the newest video</media:description>
  </media:group>
 </entry>
 <entry>
  <id>yt:video:OLD</id>
  <yt:videoId>OLD</yt:videoId>
  <title>Oldest</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=OLD"/>
  <published>2024-01-01T10:00:00+00:00</published>
 </entry>
</feed>"#;

    const BILIBILI_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
 <channel>
  <title>UP 的 bilibili 空间</title>
  <link>https://space.bilibili.com/42</link>
  <description>videos</description>
  <item>
   <title>Episode</title>
   <description><![CDATA[Intro<br><img src="https://i0.hdslb.com/cover.jpg" referrerpolicy="no-referrer">]]></description>
   <pubDate>Sat, 09 Mar 2024 08:30:00 GMT</pubDate>
   <guid isPermaLink="false">https://www.bilibili.com/video/BV1ab411c7XY</guid>
   <link>https://www.bilibili.com/video/BV1ab411c7XY</link>
  </item>
 </channel>
</rss>"#;

    #[test]
    fn test_parse_youtube_feed() {
        let feed = parse_remote_feed(Platform::Youtube, YOUTUBE_ATOM.as_bytes()).unwrap();

        assert_eq!(feed.meta.title, "Test Channel");
        assert_eq!(feed.meta.link, "https://www.youtube.com/channel/UC1");
        assert_eq!(feed.ids(), vec!["NEW", "OLD"]);

        let newest = &feed.entries[0];
        assert_eq!(newest.link, "https://www.youtube.com/watch?v=NEW");
        assert_eq!(
            newest.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/NEW/hqdefault.jpg")
        );
        assert!(newest.published_at.is_some());
    }

    #[test]
    fn test_parse_bilibili_feed() {
        let feed = parse_remote_feed(Platform::Bilibili, BILIBILI_RSS.as_bytes()).unwrap();

        assert_eq!(feed.ids(), vec!["BV1ab411c7XY"]);
        assert_eq!(
            feed.entries[0].thumbnail_url.as_deref(),
            Some("https://i0.hdslb.com/cover.jpg")
        );
    }

    #[test]
    fn test_feed_urls_follow_configured_hosts() {
        let source = HttpFeedSource::new("https://rss.test/", Duration::from_secs(5))
            .unwrap()
            .with_youtube_base("http://127.0.0.1:9000/");

        assert_eq!(
            source.feed_url(Platform::Youtube, "UC1"),
            "http://127.0.0.1:9000/feeds/videos.xml?channel_id=UC1"
        );
        assert_eq!(
            source.feed_url(Platform::Bilibili, "42"),
            "https://rss.test/bilibili/user/video/42"
        );
    }

    #[test]
    fn test_invalid_feed() {
        let result = parse_remote_feed(Platform::Youtube, b"not xml at all");
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_video_ids() {
        assert_eq!(youtube_video_id("yt:video:abc123"), "abc123");
        assert_eq!(youtube_video_id("abc123"), "abc123");
        assert_eq!(
            bilibili_video_id("https://www.bilibili.com/video/BV1xx411c7mD/"),
            "BV1xx411c7mD"
        );
        assert_eq!(bilibili_video_id("https://example.com/v/clip.mp4"), "clip");
    }

    #[test]
    fn test_cover_from_summary() {
        assert_eq!(cover_from_summary("no image here"), None);
        assert_eq!(
            cover_from_summary(r#"<img src="https://a/b.jpg" alt="x">"#).as_deref(),
            Some("https://a/b.jpg")
        );
    }
}
