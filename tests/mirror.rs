//! Mirror Integration Tests
//!
//! Mirrors a mock podsync server into an in-memory artifact store.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use podsync::adapters::{ArtifactStore, Bucket, ReleaseAsset};
use podsync::core::{FeedDocument, Mirror, MirrorOptions, Publisher};
use podsync::domain::MediaKind;

#[derive(Default)]
struct MemoryStore {
    buckets: Vec<Bucket>,
    uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        Ok(self.buckets.clone())
    }

    async fn create_bucket(&self, _bucket: &str) -> Result<()> {
        Ok(())
    }

    async fn upload(&self, bucket: &str, path: &Path) -> Result<()> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.uploads.lock().unwrap().push((bucket.to_string(), name));
        Ok(())
    }

    async fn delete_asset(&self, _asset_id: u64) -> Result<()> {
        Ok(())
    }

    fn asset_url(&self, bucket: &str, file_name: &str) -> String {
        format!("https://assets.test/{}/{}", bucket, file_name)
    }
}

fn opml(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="1.0">
  <head><title>Podcast</title></head>
  <body>
    <outline text="Lex" type="rss" xmlUrl="{base}/lex.xml" title="Lex"/>
  </body>
</opml>"#
    )
}

fn feed(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Lex</title><link>https://example.com</link><description>Lex</description>
  <item>
    <title>New</title>
    <guid isPermaLink="false">ep1</guid>
    <pubDate>Mon, 06 May 2024 10:00:00 +0000</pubDate>
    <enclosure url="{base}/media/lex/ep1.m4a" length="5" type="audio/x-m4a"/>
  </item>
  <item>
    <title>Known</title>
    <guid isPermaLink="false">ep0</guid>
    <pubDate>Sun, 05 May 2024 10:00:00 +0000</pubDate>
    <enclosure url="{base}/media/lex/ep0.m4a" length="5" type="audio/x-m4a"/>
  </item>
</channel></rss>"#
    )
}

const CACHED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Lex</title><link>https://example.com</link><description>Lex</description>
  <item>
    <title>Stale copy</title>
    <guid isPermaLink="false">ep0</guid>
    <pubDate>Sun, 05 May 2024 10:00:00 +0000</pubDate>
    <enclosure url="https://stale.test/ep0.m4a" length="1" type="audio/x-m4a"/>
  </item>
  <item>
    <title>Old</title>
    <guid isPermaLink="false">old</guid>
    <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
    <enclosure url="https://assets.test/lex/old.m4a" length="5" type="audio/x-m4a"/>
  </item>
</channel></rss>"#;

#[tokio::test]
async fn test_mirror_uploads_missing_media_and_rewrites_urls() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/podsync.opml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(opml(&base)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lex.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&base)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/lex/ep1.m4a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/lex/ep0.m4a"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let save_dir = temp.path().join("out");
    let cache_dir = temp.path().join("cache");
    std::fs::create_dir_all(&save_dir).unwrap();
    std::fs::create_dir_all(&cache_dir).unwrap();
    std::fs::write(cache_dir.join("lex.xml"), CACHED).unwrap();

    let store = Arc::new(MemoryStore {
        buckets: vec![Bucket {
            name: "lex".to_string(),
            assets: vec![ReleaseAsset {
                id: 1,
                name: "ep0.m4a".to_string(),
                updated_at: Utc::now(),
            }],
        }],
        ..Default::default()
    });
    let publisher = Publisher::connect(store.clone()).await.unwrap();

    let host = server.address().to_string();
    let options = MirrorOptions::new(host, "/podsync.opml", MediaKind::Audio, &save_dir, &cache_dir)
        .with_scheme("http");
    let mut mirror = Mirror::new(publisher, options, Duration::from_secs(5)).unwrap();

    let report = mirror.run().await.unwrap();

    assert_eq!(report.feeds, 1);
    assert_eq!(report.uploaded, 1);

    let uploads = store.uploads.lock().unwrap().clone();
    assert_eq!(
        uploads,
        vec![
            ("audio".to_string(), "podsync.opml".to_string()),
            ("lex".to_string(), "ep1.m4a".to_string()),
            ("audio".to_string(), "lex.xml".to_string()),
        ]
    );

    let saved_opml = std::fs::read_to_string(save_dir.join("podsync.opml")).unwrap();
    assert!(saved_opml.contains("https://assets.test/audio/lex.xml"));
    assert!(!saved_opml.contains(&base));

    let doc = FeedDocument::load(&save_dir.join("lex.xml")).await.unwrap();
    assert_eq!(doc.guids(), vec!["ep1", "ep0", "old"]);
    let titles: Vec<_> = doc.items().iter().map(|i| i.title.clone().unwrap()).collect();
    assert_eq!(titles, vec!["New", "Known", "Old"]);
    let urls: Vec<_> = doc
        .items()
        .iter()
        .map(|i| i.enclosure.as_ref().unwrap().url.clone())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://assets.test/lex/ep1.m4a",
            "https://assets.test/lex/ep0.m4a",
            "https://assets.test/lex/old.m4a",
        ]
    );

    // Downloaded media is removed once published
    assert!(!save_dir.join("ep1.m4a").exists());
}
