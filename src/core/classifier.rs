//! Entry classification.
//!
//! Decides, from probe metadata and feed options, whether a new entry is
//! recorded, downloaded, or left for a later run.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{EntryProbe, FeedConfig, ProcessedRecord, RemoteEntry, SHORTS_MAX_SECONDS};

/// Availability values that mean the content cannot be fetched anonymously
const RESTRICTED_AVAILABILITY: &[&str] = &["needs_auth", "premium_only", "subscriber_only"];

/// Outcome of classifying a single entry
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Upcoming or live stream; nothing is recorded so it is retried later
    Pending,

    /// Restricted or removed content, recorded but never downloaded
    Banned(ProcessedRecord),

    /// Short video on a feed that skips shorts
    ShortSkipped(ProcessedRecord),

    /// Regular content to download and publish
    Downloadable(ProcessedRecord),
}

impl Classification {
    /// Record that must be persisted for this entry, if any
    pub fn record(&self) -> Option<&ProcessedRecord> {
        match self {
            Self::Pending => None,
            Self::Banned(r) | Self::ShortSkipped(r) | Self::Downloadable(r) => Some(r),
        }
    }

    pub fn into_record(self) -> Option<ProcessedRecord> {
        match self {
            Self::Pending => None,
            Self::Banned(r) | Self::ShortSkipped(r) | Self::Downloadable(r) => Some(r),
        }
    }

    pub fn should_download(&self) -> bool {
        matches!(self, Self::Downloadable(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Banned(_) => "banned",
            Self::ShortSkipped(_) => "short_skipped",
            Self::Downloadable(_) => "downloadable",
        }
    }
}

/// Whether a probed duration counts as a short
pub fn is_short(probe: &EntryProbe) -> bool {
    probe
        .duration_seconds
        .map(|d| d <= SHORTS_MAX_SECONDS)
        .unwrap_or(false)
}

/// Classify an entry from its probe result
pub fn classify(
    entry: &RemoteEntry,
    probe: &EntryProbe,
    feed: &FeedConfig,
    now: DateTime<Utc>,
) -> Classification {
    if probe.live_status.is_pending() {
        warn!(vid = %entry.id, title = %entry.title, "Skip unfinished stream");
        return Classification::Pending;
    }

    let short = is_short(probe);
    let record = ProcessedRecord::for_entry(entry, short, now);

    let restricted = probe
        .availability
        .as_deref()
        .map(|a| RESTRICTED_AVAILABILITY.contains(&a))
        .unwrap_or(false);

    if probe.unavailable || restricted {
        warn!(
            vid = %entry.id,
            title = %entry.title,
            availability = probe.availability.as_deref().unwrap_or("gone"),
            "Skip unavailable video"
        );
        return Classification::Banned(record);
    }

    if short && feed.skip_shorts {
        warn!(vid = %entry.id, title = %entry.title, "Skip shorts");
        return Classification::ShortSkipped(record);
    }

    info!(vid = %entry.id, title = %entry.title, "Found a new video");
    Classification::Downloadable(record)
}
