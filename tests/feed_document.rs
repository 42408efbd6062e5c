//! Feed Document Integration Tests
//!
//! Merge, dedup and prune over documents that go through disk.

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rss::{Guid, Item};
use tempfile::TempDir;

use podsync::core::retention::{dedup_document_file, prune_document_file};
use podsync::core::FeedDocument;
use podsync::domain::format_record_time;

fn item(guid: &str, days_ago: i64) -> Item {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Item {
        title: Some(format!("Episode {}", guid)),
        guid: Some(Guid {
            value: guid.to_string(),
            permalink: false,
        }),
        pub_date: Some(format_record_time(base - Duration::days(days_ago))),
        ..Default::default()
    }
}

fn document(items: Vec<Item>) -> FeedDocument {
    let mut doc = FeedDocument::new();
    doc.merge_items(items);
    doc
}

#[tokio::test]
async fn test_document_round_trips_through_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("audio").join("lex.xml");

    let doc = document(vec![item("a", 0), item("b", 1)]);
    doc.save(&path).await.unwrap();

    let loaded = FeedDocument::load(&path).await.unwrap();
    assert_eq!(loaded.guids(), vec!["a", "b"]);
    assert!(loaded.to_xml().unwrap().contains("xmlns:itunes"));
}

#[tokio::test]
async fn test_missing_document_loads_empty_template() {
    let temp = TempDir::new().unwrap();
    let doc = FeedDocument::load(&temp.path().join("nope.xml")).await.unwrap();
    assert!(doc.items().is_empty());
}

#[test]
fn test_merge_twice_is_stable() {
    let mut doc = document(vec![item("a", 2), item("b", 4)]);
    let before = doc.guids().iter().map(|g| g.to_string()).collect::<Vec<_>>();

    doc.merge_items(vec![item("a", 2), item("b", 4)]);

    assert_eq!(doc.guids(), before);
    assert_eq!(doc.items().len(), 2);
}

#[test]
fn test_merge_orders_newest_first() {
    let mut doc = document(vec![item("old", 10), item("mid", 5)]);
    doc.merge_items(vec![item("new", 0)]);
    assert_eq!(doc.guids(), vec!["new", "mid", "old"]);
}

#[tokio::test]
async fn test_dedup_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lex.xml");

    let mut doc = FeedDocument::new();
    doc.items_mut()
        .extend(vec![item("a", 0), item("b", 1), item("a", 2), item("c", 3)]);
    doc.save(&path).await.unwrap();

    assert!(dedup_document_file(&path).await.unwrap());
    let once = FeedDocument::load(&path).await.unwrap();
    assert_eq!(once.guids(), vec!["a", "b", "c"]);

    assert!(!dedup_document_file(&path).await.unwrap());
    let twice = FeedDocument::load(&path).await.unwrap();
    assert_eq!(twice.guids(), once.guids());
}

#[tokio::test]
async fn test_prune_keeps_newest_items() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lex.xml");

    let items = (0..25).map(|n| item(&format!("e{}", n), n)).collect();
    document(items).save(&path).await.unwrap();

    assert!(prune_document_file(&path, 20).await.unwrap());

    let doc = FeedDocument::load(&path).await.unwrap();
    assert_eq!(doc.items().len(), 20);
    assert_eq!(doc.guids().first(), Some(&"e0"));
    assert_eq!(doc.guids().last(), Some(&"e19"));

    assert!(!prune_document_file(&path, 20).await.unwrap());
}
