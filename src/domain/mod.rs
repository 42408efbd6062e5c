//! Domain types for podsync.
//!
//! This module contains the core data structures:
//! - FeedConfig: Per-feed sync options and platform
//! - RemoteEntry: Entries read from a channel's remote feed
//! - ProcessedRecord: Persisted markers of handled entries
//! - DownloadResult: Media produced by the download delegate

pub mod entry;
pub mod feed;
pub mod media;
pub mod record;

// Re-export commonly used types
pub use entry::{EntryProbe, LiveStatus, RemoteEntry, RemoteFeed, RemoteFeedMeta};
pub use feed::{ConfigError, FeedConfig, Platform, YOUTUBE_URL};
pub use media::{part_stem, DownloadResult, MediaKind, MediaPart};
pub use record::{format_record_time, ProcessedRecord, RECORD_TIME_FORMAT, SHORTS_MAX_SECONDS};
