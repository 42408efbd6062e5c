//! Processed-set tracker.
//!
//! One JSON array per feed, newest record first. A record's presence means
//! the entry is done and must never be downloaded again.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::{ProcessedRecord, RemoteEntry};

use super::storage;

/// Persisted processed records of a single feed
#[derive(Debug, Clone)]
pub struct ProcessedStore {
    path: PathBuf,
    records: Vec<ProcessedRecord>,
}

impl ProcessedStore {
    /// Load the store; a missing file yields an empty store
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let records = match storage::read_optional(&path).await? {
            Some(content) => serde_json::from_str(&content).with_context(|| {
                format!("Failed to parse processed records: {}", path.display())
            })?,
            None => {
                warn!(path = %path.display(), "Processed records not found, starting empty");
                Vec::new()
            }
        };

        Ok(Self { path, records })
    }

    /// Create an in-memory store with the given records (not yet persisted)
    pub fn with_records(path: impl Into<PathBuf>, records: Vec<ProcessedRecord>) -> Self {
        Self {
            path: path.into(),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ProcessedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set of processed entry IDs
    pub fn processed_ids(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.vid.as_str()).collect()
    }

    pub fn contains(&self, vid: &str) -> bool {
        self.records.iter().any(|r| r.vid == vid)
    }

    /// Entries not yet processed, oldest first
    pub fn diff<'a>(&self, remote: &'a [RemoteEntry]) -> Vec<&'a RemoteEntry> {
        diff(remote, &self.records)
    }

    /// Prepend a record and persist the store
    ///
    /// Returns `false` without touching disk when the vid is already present.
    pub async fn append(&mut self, record: ProcessedRecord) -> Result<bool> {
        if self.contains(&record.vid) {
            debug!(vid = %record.vid, "Record already present, skipping append");
            return Ok(false);
        }

        self.records.insert(0, record);
        self.save().await?;
        Ok(true)
    }

    /// Keep only records matching the predicate; returns how many were dropped
    pub fn retain<F>(&mut self, predicate: F) -> usize
    where
        F: FnMut(&ProcessedRecord) -> bool,
    {
        let before = self.records.len();
        self.records.retain(predicate);
        before - self.records.len()
    }

    /// Persist the full record list
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_vec_pretty(&self.records)
            .context("Failed to serialize processed records")?;
        storage::write_atomic(&self.path, content)
            .await
            .with_context(|| format!("Failed to save processed records: {}", self.path.display()))
    }
}

/// Remote entries whose ID is not recorded, in chronological (oldest first) order
pub fn diff<'a>(remote: &'a [RemoteEntry], records: &[ProcessedRecord]) -> Vec<&'a RemoteEntry> {
    let processed: HashSet<&str> = records.iter().map(|r| r.vid.as_str()).collect();
    remote
        .iter()
        .rev()
        .filter(|entry| !processed.contains(entry.id.as_str()))
        .collect()
}
