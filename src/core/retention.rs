//! Retention and maintenance of published state.
//!
//! - expired media assets are deleted from a feed's bucket
//! - feed documents are capped and deduplicated
//! - processed records whose media never reached the bucket are dropped

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument};

use crate::adapters::ReleaseAsset;
use crate::domain::FeedConfig;

use super::podcast::FeedDocument;
use super::publisher::{BucketIndex, Publisher};
use super::tracker::ProcessedStore;

/// Asset suffixes retention may delete
pub const MEDIA_SUFFIXES: &[&str] = &[".mp4", ".m4a", ".mp3"];

fn is_media(name: &str) -> bool {
    MEDIA_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Media assets beyond the newest `keep`, newest first
pub fn expired_assets(assets: &[ReleaseAsset], keep: usize) -> Vec<&ReleaseAsset> {
    let mut sorted: Vec<&ReleaseAsset> = assets.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    sorted
        .into_iter()
        .skip(keep)
        .filter(|asset| is_media(&asset.name))
        .collect()
}

/// Delete expired media of one feed; returns how many assets were removed
///
/// `keep` is halved for feeds publishing a single media kind.
#[instrument(skip(publisher, feed), fields(feed = %feed.name))]
pub async fn clean_up_feed(publisher: &mut Publisher, feed: &FeedConfig, keep: usize) -> Result<usize> {
    let keep = feed.retention_keep(keep);
    let expired: Vec<ReleaseAsset> = expired_assets(publisher.index().assets(&feed.name), keep)
        .into_iter()
        .cloned()
        .collect();

    for asset in &expired {
        publisher.delete_asset(&feed.name, asset).await?;
    }

    info!(keep, deleted = expired.len(), "Cleaned up bucket");
    Ok(expired.len())
}

/// Cap a document to its newest `keep` items
pub fn prune_document(doc: &mut FeedDocument, keep: usize) -> usize {
    doc.prune(keep)
}

/// Prune the document at `path` and save it when it changed
pub async fn prune_document_file(path: &Path, keep: usize) -> Result<bool> {
    let mut doc = FeedDocument::load(path).await?;
    let dropped = prune_document(&mut doc, keep);
    if dropped == 0 {
        return Ok(false);
    }
    doc.save(path).await?;
    info!(path = %path.display(), dropped, "Pruned feed document");
    Ok(true)
}

/// Deduplicate the document at `path` and save it when it changed
pub async fn dedup_document_file(path: &Path) -> Result<bool> {
    let mut doc = FeedDocument::load(path).await?;
    let dropped = doc.dedup();
    if dropped == 0 {
        return Ok(false);
    }
    doc.save(path).await?;
    info!(path = %path.display(), dropped, "Removed duplicate items");
    Ok(true)
}

/// File extension whose presence proves a feed's entry was published
pub fn primary_extension(feed: &FeedConfig) -> &'static str {
    if feed.skip_video {
        "m4a"
    } else {
        "mp4"
    }
}

/// Drop records whose `{vid}.{extension}` is missing from `bucket`
///
/// Short and banned records never had media and are dropped too, so the
/// next sync looks at them again. Returns how many records were removed.
pub fn reconcile_records(
    records: &mut ProcessedStore,
    index: &BucketIndex,
    bucket: &str,
    extension: &str,
) -> usize {
    records.retain(|record| index.has_asset(bucket, &format!("{}.{}", record.vid, extension)))
}
