//! Adapter interfaces for external systems.
//!
//! Adapters wrap everything podsync does not own: remote feeds, the
//! platform prober (yt-dlp), the download delegate, the release-asset
//! store and the workflow dispatcher. The pipeline only talks to the
//! traits below so tests can swap in in-memory fakes.

pub mod cookie_cloud;
pub mod downloader;
pub mod feed_source;
pub mod github;
pub mod ytdlp;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DownloadResult, EntryProbe, Platform, RemoteEntry, RemoteFeed};

// Re-export the concrete adapters
pub use cookie_cloud::CookieCloudClient;
pub use downloader::{DownloadError, DownloadRequest, VideogramDownloader};
pub use feed_source::HttpFeedSource;
pub use github::{GitHubError, GitHubReleases};
pub use ytdlp::{ProbeError, YtDlpProber};

/// Source of remote channel feeds
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a channel's feed, entries newest first
    async fn fetch(&self, platform: Platform, channel_id: &str) -> Result<RemoteFeed>;
}

/// Reads platform metadata for a single entry
#[async_trait]
pub trait EntryProber: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self, platform: Platform, entry: &RemoteEntry) -> Result<EntryProbe, ProbeError>;
}

/// Downloads and transcodes one entry into local media files
#[async_trait]
pub trait DownloadDelegate: Send + Sync {
    fn name(&self) -> &str;

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, DownloadError>;
}

/// An asset stored in a release bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// A named bucket (release) and its assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub assets: Vec<ReleaseAsset>,
}

/// Release-asset store holding media, feed documents and records
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    /// Every bucket with its assets
    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Upload a file, replacing any asset with the same file name
    async fn upload(&self, bucket: &str, path: &Path) -> Result<()>;

    async fn delete_asset(&self, asset_id: u64) -> Result<()>;

    /// Public download URL of an asset
    fn asset_url(&self, bucket: &str, file_name: &str) -> String;
}

/// Dispatches a sync run for a single feed
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn trigger(&self, feed_name: &str, platform: Platform) -> Result<()>;
}
