//! Poll-only scheduler.
//!
//! Checks every configured feed for entries that are not yet recorded and
//! dispatches a sync run for each feed that has some. Nothing is downloaded
//! or written here.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::adapters::{FeedSource, WorkflowTrigger};
use crate::config::paths;
use crate::domain::{FeedConfig, Platform};

use super::tracker::ProcessedStore;

/// Whether any remote ID is missing from the processed set
pub fn has_new_entries<'a, I>(remote_ids: I, processed_ids: &HashSet<&str>) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    remote_ids.into_iter().any(|id| !processed_ids.contains(id))
}

/// Outcome of a scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub checked: usize,
    pub triggered: Vec<String>,
    pub failed: Vec<String>,
}

/// Scheduler over one platform's feeds
pub struct Scheduler {
    platform: Platform,
    source: Arc<dyn FeedSource>,
    trigger: Arc<dyn WorkflowTrigger>,
}

impl Scheduler {
    pub fn new(platform: Platform, source: Arc<dyn FeedSource>, trigger: Arc<dyn WorkflowTrigger>) -> Self {
        Self {
            platform,
            source,
            trigger,
        }
    }

    /// Check one feed; returns whether a run was dispatched
    pub async fn check_feed(&self, feed: &FeedConfig, metadata_dir: &Path) -> Result<bool> {
        let remote = self.source.fetch(self.platform, &feed.channel_id).await?;
        let records = ProcessedStore::load(paths::metadata_file(metadata_dir, &feed.name)).await?;

        let window = self.platform.check_window().unwrap_or(remote.entries.len());
        let remote_ids = remote.entries.iter().take(window).map(|e| e.id.as_str());

        if !has_new_entries(remote_ids, &records.processed_ids()) {
            info!(feed = %feed.name, "No new entries");
            return Ok(false);
        }

        self.trigger.trigger(&feed.name, self.platform).await?;
        Ok(true)
    }

    /// Check every feed; a failing feed is logged and does not stop the pass
    #[instrument(skip(self, feeds), fields(platform = %self.platform, feeds = feeds.len()))]
    pub async fn check_all(&self, feeds: &[FeedConfig], metadata_dir: &Path) -> CheckReport {
        let mut report = CheckReport::default();

        for feed in feeds {
            report.checked += 1;
            match self.check_feed(feed, metadata_dir).await {
                Ok(true) => report.triggered.push(feed.name.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "Check failed");
                    report.failed.push(feed.name.clone());
                }
            }
        }

        info!(
            checked = report.checked,
            triggered = report.triggered.len(),
            failed = report.failed.len(),
            "Check finished"
        );
        report
    }
}
