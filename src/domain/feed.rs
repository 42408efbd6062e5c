//! Feed configuration and platform definitions.
//!
//! Each platform keeps a JSON array of feed configs (e.g. `config/youtube.json`).
//! A feed's `name` is the key for its processed records, feed documents and
//! release bucket.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors raised while loading feed configs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read feed config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse feed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feed '{0}' not found in config")]
    NotFound(String),

    #[error("Duplicate feed name in config: {0}")]
    DuplicateName(String),
}

pub const YOUTUBE_URL: &str = "https://www.youtube.com";

/// Supported video platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// YouTube channel (Atom feed)
    Youtube,

    /// Bilibili user (RSSHub feed)
    Bilibili,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Bilibili => "bilibili",
        }
    }

    /// Remote feed URL for a channel on this platform
    pub fn feed_url(&self, channel_id: &str, youtube_url: &str, rsshub_url: &str) -> String {
        match self {
            Self::Youtube => format!(
                "{}/feeds/videos.xml?channel_id={}",
                youtube_url.trim_end_matches('/'),
                channel_id
            ),
            Self::Bilibili => format!(
                "{}/bilibili/user/video/{}",
                rsshub_url.trim_end_matches('/'),
                channel_id
            ),
        }
    }

    /// Public homepage of a channel, used in OPML outlines
    pub fn channel_url(&self, channel_id: &str) -> String {
        match self {
            Self::Youtube => format!("{}/channel/{}", YOUTUBE_URL, channel_id),
            Self::Bilibili => format!("https://space.bilibili.com/{}", channel_id),
        }
    }

    /// How many of the newest remote entries the scheduler inspects
    ///
    /// RSSHub returns a long backlog for Bilibili users, so only the head
    /// of the feed is compared.
    pub fn check_window(&self) -> Option<usize> {
        match self {
            Self::Youtube => None,
            Self::Bilibili => Some(5),
        }
    }

    /// Default feed config path for this platform
    pub fn default_config_path(&self) -> String {
        format!("config/{}.json", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync options for a single feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unique feed name (storage and bucket key)
    pub name: String,

    /// Podcast title
    pub title: String,

    /// Podcast description (falls back to the title)
    #[serde(default)]
    pub description: Option<String>,

    /// YouTube channel ID or Bilibili user ID
    #[serde(alias = "yt_channel", alias = "uid", deserialize_with = "string_or_number")]
    pub channel_id: String,

    /// Podcast cover image URL
    #[serde(default)]
    pub cover: String,

    /// Chat the download delegate mirrors media to
    #[serde(default)]
    pub tg_target: Option<String>,

    #[serde(default)]
    pub skip_audio: bool,

    #[serde(default)]
    pub skip_video: bool,

    #[serde(default)]
    pub skip_shorts: bool,
}

impl FeedConfig {
    /// Load every feed config from a JSON array file
    pub fn load_all(path: &Path) -> Result<Vec<Self>, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse_all(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse a JSON array of feed configs
    pub fn parse_all(content: &str) -> Result<Vec<Self>, ConfigError> {
        let configs: Vec<Self> =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;

        let mut seen = std::collections::HashSet::new();
        for config in &configs {
            if !seen.insert(config.name.as_str()) {
                return Err(ConfigError::DuplicateName(config.name.clone()));
            }
        }

        Ok(configs)
    }

    /// Load the config for a single feed by name
    pub fn load(path: &Path, name: &str) -> Result<Self, ConfigError> {
        Self::load_all(path)?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))
    }

    /// Chat target, falling back to the process-wide default
    pub fn target<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.tg_target
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(default)
    }

    /// Media kinds this feed publishes
    pub fn media_kinds(&self) -> Vec<super::MediaKind> {
        let mut kinds = Vec::new();
        if !self.skip_audio {
            kinds.push(super::MediaKind::Audio);
        }
        if !self.skip_video {
            kinds.push(super::MediaKind::Video);
        }
        kinds
    }

    /// Number of media assets the retention pass keeps for this feed
    pub fn retention_keep(&self, keep: usize) -> usize {
        if self.skip_audio || self.skip_video {
            keep / 2
        } else {
            keep
        }
    }
}

/// Accept either a JSON string or number (Bilibili uids are often numeric)
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
