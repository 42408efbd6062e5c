//! Podcast feed documents.
//!
//! Feed documents are RSS 2.0 channels with the iTunes and Podcasting 2.0
//! namespaces. Items are kept newest first and are unique by guid.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use rss::extension::itunes::{ITunesCategory, ITunesChannelExtension, ITunesItemExtension};
use rss::{Category, Channel, Enclosure, Guid, Image, Item};
use tracing::{debug, warn};

use crate::domain::{
    format_record_time, part_stem, FeedConfig, MediaKind, MediaPart, RemoteEntry, RemoteFeedMeta,
};

use super::storage;

pub const ITUNES_NAMESPACE: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const PODCAST_NAMESPACE: &str = "https://podcastindex.org/namespace/1.0";

const CATEGORY: &str = "TV & Film";
const GENERATOR: &str = "PodSync";
const LANGUAGE: &str = "en-us";

fn namespaces() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("itunes".to_string(), ITUNES_NAMESPACE.to_string()),
        ("podcast".to_string(), PODCAST_NAMESPACE.to_string()),
    ])
}

/// Build the channel header for a feed document
///
/// Config values win over what the remote feed reports.
pub fn build_header(feed: &FeedConfig, meta: &RemoteFeedMeta, now: DateTime<Utc>) -> Channel {
    let title = if feed.title.is_empty() {
        meta.title.clone()
    } else {
        feed.title.clone()
    };
    let description = feed
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| title.clone());
    let pub_date = meta.published.unwrap_or(now);

    Channel {
        title: title.clone(),
        link: meta.link.clone(),
        description,
        language: Some(LANGUAGE.to_string()),
        categories: vec![Category {
            name: CATEGORY.to_string(),
            domain: None,
        }],
        generator: Some(GENERATOR.to_string()),
        last_build_date: Some(format_record_time(now)),
        pub_date: Some(format_record_time(pub_date)),
        image: Some(Image {
            url: feed.cover.clone(),
            title: meta.title.clone(),
            link: meta.link.clone(),
            ..Default::default()
        }),
        itunes_ext: Some(ITunesChannelExtension {
            author: Some(title),
            block: Some("yes".to_string()),
            categories: vec![ITunesCategory {
                text: CATEGORY.to_string(),
                subcategory: None,
            }],
            image: Some(feed.cover.clone()),
            explicit: Some("no".to_string()),
            ..Default::default()
        }),
        namespaces: namespaces(),
        ..Default::default()
    }
}

/// Build one feed item per media part
///
/// Part 1 keeps the bare entry ID as guid and file stem; part n >= 2 uses
/// `{vid}-P{n}` and gets ` - P{n}` appended to its title. The parts must
/// already carry their final file names.
pub fn to_items<F>(
    entry: &RemoteEntry,
    kind: MediaKind,
    parts: &[MediaPart],
    cover: &str,
    now: DateTime<Utc>,
    asset_url: F,
) -> Result<Vec<Item>>
where
    F: Fn(&str) -> String,
{
    let pub_date = format_record_time(entry.published_at.unwrap_or(now));

    parts
        .iter()
        .enumerate()
        .map(|(idx, part)| {
            let guid = part_stem(&entry.id, idx);
            let file_name = part
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Invalid media file name: {}", part.path.display()))?;
            let length = std::fs::metadata(&part.path)
                .with_context(|| format!("Failed to stat media file: {}", part.path.display()))?
                .len();
            let title = if idx == 0 {
                entry.title.clone()
            } else {
                format!("{} - P{}", entry.title, idx + 1)
            };

            Ok(Item {
                title: Some(title),
                link: Some(entry.link.clone()),
                description: Some(entry.summary.clone()),
                enclosure: Some(Enclosure {
                    url: asset_url(file_name),
                    length: length.to_string(),
                    mime_type: kind.mime_type().to_string(),
                }),
                guid: Some(Guid {
                    value: guid,
                    permalink: false,
                }),
                pub_date: Some(pub_date.clone()),
                itunes_ext: Some(ITunesItemExtension {
                    duration: Some(part.duration_seconds.to_string()),
                    image: Some(cover.to_string()),
                    explicit: Some("no".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            })
        })
        .collect()
}

pub fn item_guid(item: &Item) -> Option<&str> {
    item.guid.as_ref().map(|g| g.value.as_str())
}

fn item_date(item: &Item) -> Option<DateTime<FixedOffset>> {
    item.pub_date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
}

/// Sort newest first; items without a parseable pubDate go last, ties keep order
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by_key(|item| Reverse(item_date(item)));
}

/// Merge new items into cached ones
///
/// New items win over cached items with the same guid. The result is sorted
/// newest first; there is no length cap.
pub fn merge(new_items: Vec<Item>, cached: Vec<Item>) -> Vec<Item> {
    let new_guids: HashSet<String> = new_items
        .iter()
        .filter_map(|i| item_guid(i).map(String::from))
        .collect();

    let mut merged = new_items;
    merged.extend(
        cached
            .into_iter()
            .filter(|item| item_guid(item).map_or(true, |g| !new_guids.contains(g))),
    );
    sort_newest_first(&mut merged);
    merged
}

/// Keep the first occurrence of each guid; returns how many items were dropped
pub fn dedup(items: &mut Vec<Item>) -> usize {
    let before = items.len();
    let mut seen = HashSet::new();
    items.retain(|item| match item_guid(item) {
        Some(g) => seen.insert(g.to_string()),
        None => true,
    });
    before - items.len()
}

/// Keep the first `keep` items; returns how many were dropped
pub fn prune(items: &mut Vec<Item>, keep: usize) -> usize {
    let before = items.len();
    items.truncate(keep);
    before - items.len()
}

/// A podcast RSS document on disk
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    channel: Channel,
}

impl Default for FeedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedDocument {
    /// Empty document with the podcast namespaces declared
    pub fn new() -> Self {
        Self {
            channel: Channel {
                namespaces: namespaces(),
                ..Default::default()
            },
        }
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    /// Load a document; a missing file yields the empty template
    pub async fn load(path: &Path) -> Result<Self> {
        match storage::read_optional(path).await? {
            Some(content) => Self::from_xml(&content)
                .with_context(|| format!("Failed to parse feed document: {}", path.display())),
            None => {
                warn!(path = %path.display(), "Feed document not found, using empty template");
                Ok(Self::new())
            }
        }
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let channel: Channel = xml.parse().context("Invalid RSS document")?;
        Ok(Self { channel })
    }

    pub fn to_xml(&self) -> Result<String> {
        let buf = self
            .channel
            .pretty_write_to(Vec::new(), b' ', 2)
            .context("Failed to serialize feed document")?;
        String::from_utf8(buf).context("Feed document is not valid UTF-8")
    }

    /// Write the document atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        storage::write_atomic(path, xml.into_bytes())
            .await
            .with_context(|| format!("Failed to save feed document: {}", path.display()))?;
        debug!(path = %path.display(), items = self.channel.items.len(), "Saved feed document");
        Ok(())
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn items(&self) -> &[Item] {
        &self.channel.items
    }

    pub fn items_mut(&mut self) -> &mut Vec<Item> {
        &mut self.channel.items
    }

    pub fn guids(&self) -> Vec<&str> {
        self.channel.items.iter().filter_map(item_guid).collect()
    }

    /// Replace the header and merge new items into the existing ones
    pub fn update(&mut self, header: Channel, new_items: Vec<Item>) {
        let cached = std::mem::take(&mut self.channel.items);
        let mut namespaces = self.channel.namespaces.clone();
        namespaces.extend(header.namespaces.clone());

        self.channel = header;
        self.channel.namespaces = namespaces;
        self.channel.items = merge(new_items, cached);
    }

    /// Merge items while keeping the current header
    pub fn merge_items(&mut self, new_items: Vec<Item>) {
        let cached = std::mem::take(&mut self.channel.items);
        self.channel.items = merge(new_items, cached);
    }

    pub fn dedup(&mut self) -> usize {
        dedup(&mut self.channel.items)
    }

    pub fn prune(&mut self, keep: usize) -> usize {
        prune(&mut self.channel.items, keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn item(guid: &str, date: Option<&str>) -> Item {
        Item {
            title: Some(guid.to_uppercase()),
            guid: Some(Guid {
                value: guid.to_string(),
                permalink: false,
            }),
            pub_date: date.map(String::from),
            ..Default::default()
        }
    }

    fn guids(items: &[Item]) -> Vec<&str> {
        items.iter().filter_map(item_guid).collect()
    }

    fn feed() -> FeedConfig {
        FeedConfig {
            name: "lex".to_string(),
            title: "Lex".to_string(),
            description: None,
            channel_id: "UC1".to_string(),
            cover: "https://example.com/cover.jpg".to_string(),
            tg_target: None,
            skip_audio: false,
            skip_video: false,
            skip_shorts: false,
        }
    }

    #[test]
    fn test_header_fields() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let meta = RemoteFeedMeta {
            title: "Remote Title".to_string(),
            link: "https://www.youtube.com/channel/UC1".to_string(),
            author: None,
            published: None,
        };

        let header = build_header(&feed(), &meta, now);
        assert_eq!(header.title, "Lex");
        assert_eq!(header.description, "Lex");
        assert_eq!(header.language.as_deref(), Some("en-us"));
        assert_eq!(header.generator.as_deref(), Some("PodSync"));
        assert_eq!(header.pub_date.as_deref(), Some("Wed, 01 May 2024 12:00:00 +0000"));
        assert_eq!(header.namespaces.get("podcast").map(String::as_str), Some(PODCAST_NAMESPACE));

        let itunes = header.itunes_ext.unwrap();
        assert_eq!(itunes.block.as_deref(), Some("yes"));
        assert_eq!(itunes.explicit.as_deref(), Some("no"));
        assert_eq!(itunes.image.as_deref(), Some("https://example.com/cover.jpg"));
    }

    #[test]
    fn test_merge_new_first_sorted() {
        let cached = vec![
            item("b", Some("Tue, 02 Jan 2024 00:00:00 +0000")),
            item("a", Some("Mon, 01 Jan 2024 00:00:00 +0000")),
        ];
        let new = vec![item("c", Some("Wed, 03 Jan 2024 00:00:00 +0000"))];

        let merged = merge(new, cached);
        assert_eq!(guids(&merged), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_merge_replaces_colliding_guid() {
        let cached = vec![item("a", Some("Mon, 01 Jan 2024 00:00:00 +0000"))];
        let mut replacement = item("a", Some("Mon, 01 Jan 2024 00:00:00 +0000"));
        replacement.title = Some("NEW".to_string());

        let merged = merge(vec![replacement], cached);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title.as_deref(), Some("NEW"));
    }

    #[test]
    fn test_undated_items_sink() {
        let mut items = vec![
            item("x", None),
            item("y", Some("not a date")),
            item("a", Some("Mon, 01 Jan 2024 00:00:00 +0000")),
        ];
        sort_newest_first(&mut items);
        assert_eq!(guids(&items), vec!["a", "x", "y"]);
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mut items = vec![item("a", None), item("b", None), item("a", None)];
        items[0].title = Some("first".to_string());

        assert_eq!(dedup(&mut items), 1);
        assert_eq!(guids(&items), vec!["a", "b"]);
        assert_eq!(items[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn test_to_items_part_naming() {
        let temp = TempDir::new().unwrap();
        let parts: Vec<MediaPart> = ["vid.m4a", "vid-P2.m4a"]
            .iter()
            .map(|name| {
                let path = temp.path().join(name);
                std::fs::write(&path, b"12345").unwrap();
                MediaPart::new(path, 120)
            })
            .collect();
        let entry = RemoteEntry::new("vid", "Talk", "https://youtu.be/vid").with_summary("desc");

        let items = to_items(&entry, MediaKind::Audio, &parts, "cover", Utc::now(), |f| {
            format!("https://dl/{}", f)
        })
        .unwrap();

        assert_eq!(guids(&items), vec!["vid", "vid-P2"]);
        assert_eq!(items[0].title.as_deref(), Some("Talk"));
        assert_eq!(items[1].title.as_deref(), Some("Talk - P2"));

        let enclosure = items[1].enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, "https://dl/vid-P2.m4a");
        assert_eq!(enclosure.length, "5");
        assert_eq!(enclosure.mime_type, "audio/x-m4a");
        assert_eq!(
            items[0].itunes_ext.as_ref().unwrap().duration.as_deref(),
            Some("120")
        );
    }

    #[tokio::test]
    async fn test_document_round_trip_on_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audio/lex.xml");

        let mut doc = FeedDocument::load(&path).await.unwrap();
        assert!(doc.items().is_empty());

        let header = build_header(&feed(), &RemoteFeedMeta::default(), Utc::now());
        doc.update(header, vec![item("a", Some("Mon, 01 Jan 2024 00:00:00 +0000"))]);
        doc.save(&path).await.unwrap();

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("xmlns:itunes"));
        assert!(xml.contains("xmlns:podcast"));

        let reloaded = FeedDocument::load(&path).await.unwrap();
        assert_eq!(reloaded.guids(), vec!["a"]);
        assert_eq!(reloaded.channel().title, "Lex");
    }
}
