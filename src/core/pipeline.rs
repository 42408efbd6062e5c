//! Per-feed sync pipeline.
//!
//! Fetches a feed, diffs it against the processed records and handles each
//! new entry, oldest first, strictly one at a time:
//!
//! probe → classify → download → publish media → update feed documents →
//! record → publish records and documents → clean up local files.
//!
//! A record is written only once everything it stands for is published, so
//! an aborted run leaves earlier entries committed and later ones untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rss::Channel;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{
    ArtifactStore, DownloadDelegate, DownloadRequest, EntryProber, FeedSource, ProbeError,
};
use crate::config::paths;
use crate::domain::{
    part_stem, DownloadResult, EntryProbe, FeedConfig, MediaKind, MediaPart, Platform, RemoteEntry,
};

use super::classifier::{classify, Classification};
use super::podcast::{build_header, to_items, FeedDocument};
use super::publisher::{remove_local, Publisher};
use super::tracker::ProcessedStore;

/// Counters of a finished sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entries not yet processed when the run started
    pub new_entries: usize,
    /// Records appended
    pub recorded: usize,
    /// Entries downloaded and published
    pub downloaded: usize,
    /// Unfinished streams left for a later run
    pub deferred: usize,
    /// Entries skipped after a transient failure
    pub failed: usize,
}

/// External systems the pipeline talks to
#[derive(Clone)]
pub struct PipelineAdapters {
    pub source: Arc<dyn FeedSource>,
    pub prober: Arc<dyn EntryProber>,
    pub downloader: Arc<dyn DownloadDelegate>,
    pub store: Arc<dyn ArtifactStore>,
}

/// Local paths and defaults for a run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory holding `audio/` and `video/` feed documents
    pub work_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub default_tg_target: Option<String>,
}

impl PipelineOptions {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            work_dir: settings.work_dir.clone(),
            metadata_dir: settings.metadata_dir.clone(),
            default_tg_target: settings.default_tg_target.clone(),
        }
    }
}

/// Sync pipeline for a single feed
pub struct SyncPipeline {
    platform: Platform,
    feed: FeedConfig,
    adapters: PipelineAdapters,
    options: PipelineOptions,
}

/// Mutable state of one run
struct RunState {
    records: ProcessedStore,
    publisher: Publisher,
    documents: BTreeMap<MediaKind, FeedDocument>,
    header: Channel,
    now: DateTime<Utc>,
    report: SyncReport,
}

impl SyncPipeline {
    pub fn new(
        platform: Platform,
        feed: FeedConfig,
        adapters: PipelineAdapters,
        options: PipelineOptions,
    ) -> Self {
        Self {
            platform,
            feed,
            adapters,
            options,
        }
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    fn metadata_path(&self) -> PathBuf {
        paths::metadata_file(&self.options.metadata_dir, &self.feed.name)
    }

    fn document_path(&self, kind: MediaKind) -> PathBuf {
        paths::document_file(&self.options.work_dir, kind, &self.feed.name)
    }

    /// Run the pipeline once
    #[instrument(skip(self), fields(feed = %self.feed.name, platform = %self.platform))]
    pub async fn run(&self) -> Result<SyncReport> {
        info!("Processing feed");

        let remote = self
            .adapters
            .source
            .fetch(self.platform, &self.feed.channel_id)
            .await
            .with_context(|| format!("Failed to fetch remote feed for {}", self.feed.name))?;

        let records = ProcessedStore::load(self.metadata_path()).await?;
        let pending: Vec<RemoteEntry> = records.diff(&remote.entries).into_iter().cloned().collect();

        if pending.is_empty() {
            info!(remote = remote.entries.len(), "No new entries");
            return Ok(SyncReport::default());
        }
        info!(new = pending.len(), "Found new entries");

        let publisher = Publisher::connect(self.adapters.store.clone()).await?;

        let mut documents = BTreeMap::new();
        for kind in self.feed.media_kinds() {
            let doc = FeedDocument::load(&self.document_path(kind)).await?;
            documents.insert(kind, doc);
        }

        let now = Utc::now();
        let mut state = RunState {
            records,
            publisher,
            documents,
            header: build_header(&self.feed, &remote.meta, now),
            now,
            report: SyncReport {
                new_entries: pending.len(),
                ..Default::default()
            },
        };

        for entry in &pending {
            self.process_entry(&mut state, entry)
                .await
                .with_context(|| format!("Aborting sync of {} at {}", self.feed.name, entry.id))?;
        }

        info!(
            recorded = state.report.recorded,
            downloaded = state.report.downloaded,
            deferred = state.report.deferred,
            failed = state.report.failed,
            "Feed processed"
        );
        Ok(state.report)
    }

    /// Handle one entry; `Err` aborts the run
    async fn process_entry(&self, state: &mut RunState, entry: &RemoteEntry) -> Result<()> {
        info!(vid = %entry.id, title = %entry.title, "New entry");

        let probe = match self.adapters.prober.probe(self.platform, entry).await {
            Ok(probe) => probe,
            Err(ProbeError::Unavailable(reason)) => {
                debug!(vid = %entry.id, reason = %reason, "Entry unavailable");
                EntryProbe::unavailable()
            }
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("Probe of {} failed", entry.id));
            }
            Err(e) => {
                warn!(vid = %entry.id, error = %e, "Probe failed, will retry next run");
                state.report.failed += 1;
                return Ok(());
            }
        };

        let classification = classify(entry, &probe, &self.feed, state.now);
        debug!(vid = %entry.id, state = classification.label(), "Classified");

        if let Classification::Pending = classification {
            state.report.deferred += 1;
            return Ok(());
        }

        let mut changed = Vec::new();
        if classification.should_download() {
            let request = DownloadRequest {
                url: entry.link.clone(),
                tg_target: self
                    .feed
                    .target(self.options.default_tg_target.as_deref())
                    .map(String::from),
                audio: !self.feed.skip_audio,
                video: !self.feed.skip_video,
            };

            let download = match self.adapters.downloader.download(&request).await {
                Ok(download) => download,
                Err(e) if e.is_fatal() => {
                    return Err(e).with_context(|| format!("Download of {} failed", entry.id));
                }
                Err(e) => {
                    warn!(vid = %entry.id, error = %e, "Download failed, will retry next run");
                    state.report.failed += 1;
                    self.cleanup_leftovers(&entry.title).await;
                    return Ok(());
                }
            };

            changed = self.publish_download(state, entry, download).await?;
            state.report.downloaded += 1;
        }

        if let Some(record) = classification.into_record() {
            if state.records.append(record).await? {
                state.report.recorded += 1;
                state
                    .publisher
                    .publish(state.records.path(), paths::METADATA_BUCKET, false)
                    .await?;
            }
        }

        for kind in changed {
            state
                .publisher
                .publish(&self.document_path(kind), kind.bucket(), false)
                .await?;
        }

        Ok(())
    }

    /// Publish downloaded media and fold it into the feed documents
    ///
    /// Returns the media kinds whose documents changed.
    async fn publish_download(
        &self,
        state: &mut RunState,
        entry: &RemoteEntry,
        mut download: DownloadResult,
    ) -> Result<Vec<MediaKind>> {
        let cover = entry
            .thumbnail_url
            .clone()
            .unwrap_or_else(|| self.feed.cover.clone());

        let mut changed = Vec::new();
        for kind in self.feed.media_kinds() {
            let parts = rename_parts(&entry.id, download.parts(kind)).await?;
            if parts.is_empty() {
                warn!(vid = %entry.id, kind = %kind, "Download produced no files");
                continue;
            }

            for part in &parts {
                state
                    .publisher
                    .publish(&part.path, &self.feed.name, false)
                    .await?;
            }

            let publisher = &state.publisher;
            let bucket = self.feed.name.as_str();
            let items = to_items(entry, kind, &parts, &cover, state.now, |file| {
                publisher.asset_url(bucket, file)
            })?;

            let doc = state.documents.entry(kind).or_default();
            doc.update(state.header.clone(), items);
            doc.save(&self.document_path(kind)).await?;

            *download.parts_mut(kind) = parts;
            changed.push(kind);
        }

        for path in download.all_paths() {
            remove_local(path).await;
        }
        self.cleanup_leftovers(&entry.title).await;
        if download.title != entry.title && !download.title.is_empty() {
            self.cleanup_leftovers(&download.title).await;
        }

        Ok(changed)
    }

    /// Remove files the downloader left behind for a title
    async fn cleanup_leftovers(&self, title: &str) {
        let Some(pattern) = paths::leftover_pattern(&self.options.work_dir, title) else {
            return;
        };
        let matches = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid leftover pattern");
                return;
            }
        };
        for path in matches.flatten() {
            remove_local(&path).await;
        }
    }
}

/// Rename downloaded parts to `{vid}[-P{n}].{ext}` next to the originals
pub async fn rename_parts(vid: &str, parts: &[MediaPart]) -> Result<Vec<MediaPart>> {
    let mut renamed = Vec::with_capacity(parts.len());
    for (idx, part) in parts.iter().enumerate() {
        let target = part_path(&part.path, &part_stem(vid, idx));
        if target != part.path {
            tokio::fs::rename(&part.path, &target).await.with_context(|| {
                format!(
                    "Failed to rename {} to {}",
                    part.path.display(),
                    target.display()
                )
            })?;
        }
        renamed.push(MediaPart::new(target, part.duration_seconds));
    }
    Ok(renamed)
}

fn part_path(original: &Path, stem: &str) -> PathBuf {
    match original.extension() {
        Some(ext) => original.with_file_name(format!("{}.{}", stem, ext.to_string_lossy())),
        None => original.with_file_name(stem),
    }
}
