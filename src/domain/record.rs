//! Processed records, the durable "already handled" markers.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::RemoteEntry;

/// Timestamp format stored in `time` (RFC 2822 with numeric offset)
pub const RECORD_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Durations at or below this many seconds count as shorts
pub const SHORTS_MAX_SECONDS: f64 = 60.0;

/// A handled entry, persisted as one element of `metadata/<name>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub title: String,

    /// Platform entry ID
    pub vid: String,

    #[serde(default)]
    pub shorts: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl ProcessedRecord {
    /// Build a record for an entry, stamped with its publish time (or `now`)
    pub fn for_entry(entry: &RemoteEntry, shorts: bool, now: DateTime<Utc>) -> Self {
        let at = entry.published_at.unwrap_or(now);
        Self {
            title: entry.title.clone(),
            vid: entry.id.clone(),
            shorts,
            time: Some(format_record_time(at)),
        }
    }

    /// Parsed timestamp, if present and well formed
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.time
            .as_deref()
            .and_then(|t| DateTime::parse_from_str(t, RECORD_TIME_FORMAT).ok())
    }
}

pub fn format_record_time(at: DateTime<Utc>) -> String {
    at.format(RECORD_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_legacy_record_without_optional_fields() {
        let record: ProcessedRecord =
            serde_json::from_str(r#"{"title": "Old", "vid": "BV1xx"}"#).unwrap();
        assert!(!record.shorts);
        assert!(record.time.is_none());
        assert!(record.timestamp().is_none());
    }

    #[test]
    fn test_record_time_uses_publish_date() {
        let published = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        let entry = RemoteEntry::new("abc", "Title", "https://youtu.be/abc")
            .with_published(published);

        let record = ProcessedRecord::for_entry(&entry, true, Utc::now());
        assert_eq!(record.time.as_deref(), Some("Sat, 09 Mar 2024 08:30:00 +0000"));
        assert_eq!(record.timestamp().unwrap(), published);
        assert!(record.shorts);
    }

    #[test]
    fn test_record_time_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let entry = RemoteEntry::new("abc", "Title", "https://youtu.be/abc");

        let record = ProcessedRecord::for_entry(&entry, false, now);
        assert_eq!(record.timestamp().unwrap(), now);
    }
}
