//! podsync - Mirror video channels as podcast feeds
//!
//! Polls YouTube and Bilibili channels, hands new videos to an external
//! downloader, uploads the resulting media as GitHub release assets and
//! regenerates the podcast RSS and OPML documents that point at them.
//!
//! # Architecture
//!
//! Each sync run handles one feed, strictly sequentially:
//! - New entries are found by diffing the remote feed against the
//!   persisted processed records
//! - A record is written only after its media and documents are published
//! - A run aborted midway keeps every record written before the failure
//!
//! # Modules
//!
//! - `adapters`: External systems (remote feeds, yt-dlp, downloader, GitHub)
//! - `core`: Sync logic (tracker, classifier, feed documents, pipeline)
//! - `domain`: Data structures (FeedConfig, RemoteEntry, ProcessedRecord)
//! - `config`: Runtime settings and on-disk layout
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Sync a single feed
//! podsync sync --platform youtube --name lex
//!
//! # Dispatch sync runs for feeds with new entries
//! podsync check --platform bilibili
//!
//! # Rebuild the OPML indexes
//! podsync refresh-opml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{FeedDocument, OpmlDocument, ProcessedStore, SyncPipeline, SyncReport};
pub use domain::{FeedConfig, MediaKind, Platform, ProcessedRecord, RemoteEntry};
