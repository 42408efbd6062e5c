//! Artifact publishing.
//!
//! [`BucketIndex`] is a snapshot of the store taken at the start of a run
//! and kept current as the run uploads or deletes assets. [`Publisher`]
//! pairs it with an [`ArtifactStore`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::adapters::{ArtifactStore, Bucket, ReleaseAsset};

/// Snapshot of buckets and their assets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketIndex {
    buckets: BTreeMap<String, Vec<ReleaseAsset>>,
}

impl BucketIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buckets(buckets: Vec<Bucket>) -> Self {
        Self {
            buckets: buckets.into_iter().map(|b| (b.name, b.assets)).collect(),
        }
    }

    pub fn contains_bucket(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Assets of a bucket (empty when the bucket does not exist)
    pub fn assets(&self, bucket: &str) -> &[ReleaseAsset] {
        self.buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_asset(&self, bucket: &str, file_name: &str) -> bool {
        self.assets(bucket).iter().any(|a| a.name == file_name)
    }

    pub fn insert_bucket(&mut self, bucket: &str) {
        self.buckets.entry(bucket.to_string()).or_default();
    }

    /// Record an upload, replacing an asset with the same name
    pub fn record_upload(&mut self, bucket: &str, file_name: &str) {
        let assets = self.buckets.entry(bucket.to_string()).or_default();
        let now = Utc::now();
        match assets.iter_mut().find(|a| a.name == file_name) {
            Some(existing) => existing.updated_at = now,
            None => assets.push(ReleaseAsset {
                id: 0,
                name: file_name.to_string(),
                updated_at: now,
            }),
        }
    }

    pub fn remove_asset(&mut self, bucket: &str, asset_id: u64) {
        if let Some(assets) = self.buckets.get_mut(bucket) {
            assets.retain(|a| a.id != asset_id);
        }
    }
}

/// Uploads files into buckets of an artifact store
pub struct Publisher {
    store: Arc<dyn ArtifactStore>,
    index: BucketIndex,
}

impl Publisher {
    /// Create a publisher with an empty index; call [`Publisher::refresh`] before use
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            index: BucketIndex::new(),
        }
    }

    /// Create a publisher and load a fresh index
    pub async fn connect(store: Arc<dyn ArtifactStore>) -> Result<Self> {
        let mut publisher = Self::new(store);
        publisher.refresh().await?;
        Ok(publisher)
    }

    /// Reload the bucket index from the store
    pub async fn refresh(&mut self) -> Result<()> {
        let buckets = self
            .store
            .list_buckets()
            .await
            .with_context(|| format!("Failed to list buckets of {}", self.store.name()))?;
        self.index = BucketIndex::from_buckets(buckets);
        debug!(buckets = self.index.buckets.len(), "Refreshed bucket index");
        Ok(())
    }

    pub fn index(&self) -> &BucketIndex {
        &self.index
    }

    pub fn asset_url(&self, bucket: &str, file_name: &str) -> String {
        self.store.asset_url(bucket, file_name)
    }

    /// Upload `path` into `bucket`, creating the bucket if needed
    ///
    /// Bucket creation failures are logged and ignored (the bucket may have
    /// been created concurrently); upload failures are returned. With `clean`
    /// the local file is removed after a successful upload.
    pub async fn publish(&mut self, path: &Path, bucket: &str, clean: bool) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?
            .to_string();

        if !self.index.contains_bucket(bucket) {
            if let Err(e) = self.store.create_bucket(bucket).await {
                warn!(bucket = %bucket, error = %e, "Bucket creation failed, uploading anyway");
            }
            self.index.insert_bucket(bucket);
        }

        self.store
            .upload(bucket, path)
            .await
            .with_context(|| format!("Failed to publish {} to {}", file_name, bucket))?;
        self.index.record_upload(bucket, &file_name);
        info!(bucket = %bucket, file = %file_name, "Published");

        if clean {
            remove_local(path).await;
        }

        Ok(self.store.asset_url(bucket, &file_name))
    }

    /// Delete an asset from the store and the index
    pub async fn delete_asset(&mut self, bucket: &str, asset: &ReleaseAsset) -> Result<()> {
        self.store
            .delete_asset(asset.id)
            .await
            .with_context(|| format!("Failed to delete {} from {}", asset.name, bucket))?;
        self.index.remove_asset(bucket, asset.id);
        info!(bucket = %bucket, file = %asset.name, "Deleted asset");
        Ok(())
    }
}

/// Remove a local file, ignoring files that are already gone
pub async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed local file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove local file"),
    }
}
