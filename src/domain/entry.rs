//! Remote feed entries and per-entry probe results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel-level metadata of a remote feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFeedMeta {
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// A single entry of a remote feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Stable platform ID (YouTube video ID or Bilibili BV ID)
    pub id: String,

    pub title: String,

    /// Canonical watch URL
    pub link: String,

    pub published_at: Option<DateTime<Utc>>,

    /// Plain or HTML summary
    #[serde(default)]
    pub summary: String,

    /// Thumbnail URL if the feed carries one
    pub thumbnail_url: Option<String>,
}

impl RemoteEntry {
    /// Create an entry with only the required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            published_at: None,
            summary: String::new(),
            thumbnail_url: None,
        }
    }

    pub fn with_published(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }
}

/// A fetched remote feed, entries newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFeed {
    pub meta: RemoteFeedMeta,
    pub entries: Vec<RemoteEntry>,
}

impl RemoteFeed {
    /// IDs in remote order
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Broadcast state reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    NotLive,
    IsUpcoming,
    IsLive,
    PostLive,
    WasLive,
    #[serde(other)]
    Unknown,
}

impl LiveStatus {
    /// Stream has not finished, the entry must be retried later
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::IsUpcoming | Self::IsLive | Self::PostLive)
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::NotLive
    }
}

/// Metadata read from the platform for one entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryProbe {
    #[serde(default, deserialize_with = "null_as_default")]
    pub live_status: LiveStatus,

    /// Duration in seconds; absent for upcoming streams
    #[serde(default, rename = "duration")]
    pub duration_seconds: Option<f64>,

    /// e.g. `public`, `needs_auth`, `premium_only`
    #[serde(default)]
    pub availability: Option<String>,

    /// Set when the platform reports the content as gone
    #[serde(skip)]
    pub unavailable: bool,
}

impl EntryProbe {
    /// Probe result for content the platform no longer serves
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }
}

fn null_as_default<'de, D>(deserializer: D) -> Result<LiveStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<LiveStatus>::deserialize(deserializer)?.unwrap_or_default())
}
