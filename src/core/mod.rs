//! Core sync logic.
//!
//! This module contains:
//! - ProcessedStore: Persisted processed records and the remote diff
//! - Classifier: Decides what happens to a new entry
//! - FeedDocument / OpmlDocument: Podcast RSS and OPML builders
//! - Publisher: Uploads into the artifact store over a bucket index
//! - SyncPipeline: Per-feed sync run
//! - Scheduler: Poll-only check that dispatches sync runs
//! - Retention / Mirror: Maintenance commands

pub mod classifier;
pub mod mirror;
pub mod opml;
pub mod pipeline;
pub mod podcast;
pub mod publisher;
pub mod retention;
pub mod scheduler;
pub mod storage;
pub mod tracker;

// Re-export commonly used types
pub use classifier::{classify, Classification};
pub use mirror::{Mirror, MirrorOptions, MirrorReport};
pub use opml::{OpmlDocument, OpmlError, Outline};
pub use pipeline::{PipelineAdapters, PipelineOptions, SyncPipeline, SyncReport};
pub use podcast::FeedDocument;
pub use publisher::{BucketIndex, Publisher};
pub use retention::expired_assets;
pub use scheduler::{has_new_entries, CheckReport, Scheduler};
pub use tracker::ProcessedStore;
