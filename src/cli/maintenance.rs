//! Maintenance commands over published state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{self, paths};
use crate::core::retention::{
    clean_up_feed, dedup_document_file, primary_extension, prune_document_file, reconcile_records,
};
use crate::core::{OpmlDocument, ProcessedStore, Publisher};
use crate::domain::{FeedConfig, MediaKind, Platform};

use super::{artifact_store, load_all_platforms, load_feeds, platform_by_name};

const ALL_KINDS: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];

fn selected_kinds(kind: Option<MediaKind>) -> Vec<MediaKind> {
    match kind {
        Some(kind) => vec![kind],
        None => ALL_KINDS.to_vec(),
    }
}

/// Feed documents of a kind directory (the OPML index is skipped)
async fn feed_documents(kind_dir: PathBuf) -> Result<Vec<PathBuf>> {
    let pattern = kind_dir.join("*.xml");
    let pattern = pattern.to_string_lossy().into_owned();

    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut docs: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?
            .flatten()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(paths::OPML_FILE))
            .collect();
        docs.sort();
        Ok(docs)
    })
    .await
    .context("Document scan task panicked")?
}

/// Rebuild and republish the OPML index of each media kind
pub async fn execute_refresh_opml() -> Result<()> {
    let settings = config::settings()?;
    let feeds = load_all_platforms(settings)?;
    let platforms = platform_by_name(&feeds);
    let mut publisher = Publisher::connect(artifact_store(settings)?).await?;

    for kind in ALL_KINDS {
        let configs: Vec<FeedConfig> = feeds
            .iter()
            .filter(|(_, feed)| feed.media_kinds().contains(&kind))
            .map(|(_, feed)| feed.clone())
            .collect();

        let path = paths::opml_file(&settings.work_dir, kind);
        let mut opml = OpmlDocument::load(&path).await?;
        if !opml.needs_update(&configs) {
            info!(kind = %kind, "OPML is up to date");
            continue;
        }

        let asset_publisher = &publisher;
        opml.update(
            &configs,
            |feed| asset_publisher.asset_url(kind.bucket(), &kind.document_name(&feed.name)),
            |feed| {
                platforms
                    .get(&feed.name)
                    .copied()
                    .unwrap_or(Platform::Youtube)
                    .channel_url(&feed.channel_id)
            },
        );
        opml.save(&path).await?;
        publisher.publish(&path, kind.bucket(), false).await?;
        info!(kind = %kind, feeds = configs.len(), "OPML refreshed");
    }

    Ok(())
}

/// Delete expired media from every feed bucket of a platform
pub async fn execute_clean_up(platform: Platform, keep: Option<usize>) -> Result<()> {
    let settings = config::settings()?;
    let Some(feeds) = load_feeds(settings, platform, None)? else {
        return Ok(());
    };
    let keep = keep.unwrap_or(settings.keep_assets);

    let mut publisher = Publisher::connect(artifact_store(settings)?).await?;
    let mut deleted = 0;
    for feed in &feeds {
        deleted += clean_up_feed(&mut publisher, feed, keep).await?;
    }

    println!("Deleted {} expired assets", deleted);
    Ok(())
}

/// Cap every feed document and republish the ones that changed
pub async fn execute_prune(keep: Option<usize>, kind: Option<MediaKind>) -> Result<()> {
    let settings = config::settings()?;
    let keep = keep.unwrap_or(settings.keep_items);
    let mut publisher = Publisher::connect(artifact_store(settings)?).await?;

    for kind in selected_kinds(kind) {
        for path in feed_documents(settings.work_dir.join(kind.as_str())).await? {
            if prune_document_file(&path, keep).await? {
                publisher.publish(&path, kind.bucket(), false).await?;
            }
        }
    }
    Ok(())
}

/// Deduplicate every feed document and republish the ones that changed
pub async fn execute_dedup(kind: Option<MediaKind>) -> Result<()> {
    let settings = config::settings()?;
    let mut publisher = Publisher::connect(artifact_store(settings)?).await?;

    for kind in selected_kinds(kind) {
        for path in feed_documents(settings.work_dir.join(kind.as_str())).await? {
            if dedup_document_file(&path).await? {
                publisher.publish(&path, kind.bucket(), false).await?;
            }
        }
    }
    Ok(())
}

/// Reconcile processed records against the media actually published
pub async fn execute_prune_failed(platform: Platform, name: Option<&str>) -> Result<()> {
    let settings = config::settings()?;
    let Some(feeds) = load_feeds(settings, platform, None)? else {
        return Ok(());
    };
    let mut publisher = Publisher::connect(artifact_store(settings)?).await?;

    for feed in feeds.iter().filter(|f| name.map_or(true, |n| f.name == n)) {
        if !publisher.index().contains_bucket(&feed.name) {
            warn!(feed = %feed.name, "Bucket not found, skipping");
            continue;
        }

        let path = paths::metadata_file(&settings.metadata_dir, &feed.name);
        let mut records = ProcessedStore::load(&path).await?;
        let removed = reconcile_records(
            &mut records,
            publisher.index(),
            &feed.name,
            primary_extension(feed),
        );
        if removed == 0 {
            continue;
        }

        records.save().await?;
        publisher.publish(&path, paths::METADATA_BUCKET, false).await?;
        info!(feed = %feed.name, removed, "Dropped records without media");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_feed_documents_skip_opml() {
        let temp = TempDir::new().unwrap();
        for name in ["lex.xml", "podsync.opml", "b.xml", "notes.txt"] {
            std::fs::write(temp.path().join(name), b"").unwrap();
        }

        let docs = feed_documents(temp.path().to_path_buf()).await.unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["b.xml", "lex.xml"]);
    }

    #[test]
    fn test_selected_kinds() {
        assert_eq!(selected_kinds(None), vec![MediaKind::Audio, MediaKind::Video]);
        assert_eq!(selected_kinds(Some(MediaKind::Video)), vec![MediaKind::Video]);
    }
}
