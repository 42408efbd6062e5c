//! Mirror of a foreign podsync server.
//!
//! Pulls another server's OPML and feed documents, copies every enclosure
//! into the local artifact store and republishes the documents with their
//! URLs pointing at the store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::domain::MediaKind;

use super::opml::{feed_name_from_url, OpmlDocument};
use super::podcast::{merge, FeedDocument};
use super::publisher::Publisher;
use super::storage;

/// Where to mirror from and where local copies go
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub remote_host: String,
    /// Path of the OPML file on the remote host
    pub remote_path: String,
    pub pod_type: MediaKind,
    /// Directory the rewritten documents and downloads are written to
    pub save_dir: PathBuf,
    /// Directory holding previously mirrored documents
    pub cache_dir: PathBuf,
    pub scheme: String,
}

impl MirrorOptions {
    pub fn new(
        remote_host: impl Into<String>,
        remote_path: impl Into<String>,
        pod_type: MediaKind,
        save_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_path: remote_path.into(),
            pod_type,
            save_dir: save_dir.into(),
            cache_dir: cache_dir.into(),
            scheme: "https".to_string(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    fn remote_base(&self) -> String {
        format!("{}://{}", self.scheme, self.remote_host)
    }

    fn opml_url(&self) -> String {
        format!(
            "{}/{}",
            self.remote_base(),
            self.remote_path.trim_start_matches('/')
        )
    }
}

/// Counters of a mirror run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub feeds: usize,
    pub uploaded: usize,
}

pub struct Mirror {
    client: reqwest::Client,
    publisher: Publisher,
    options: MirrorOptions,
}

impl Mirror {
    pub fn new(publisher: Publisher, options: MirrorOptions, http_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("podsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            publisher,
            options,
        })
    }

    fn bucket(&self) -> &'static str {
        self.options.pod_type.bucket()
    }

    /// Mirror the OPML and every feed it lists
    #[instrument(skip(self), fields(host = %self.options.remote_host, kind = %self.options.pod_type))]
    pub async fn run(&mut self) -> Result<MirrorReport> {
        let opml_url = self.options.opml_url();
        info!(url = %opml_url, "Fetching remote OPML");
        let original = self.fetch_text(&opml_url).await?;

        let local_base = self.publisher.asset_url(self.bucket(), "");
        let rewritten = rewrite_host(&original, &self.options.remote_base(), &local_base);

        let opml_name = file_name_from_url(&opml_url).unwrap_or_else(|| "podsync.opml".to_string());
        let opml_path = self.options.save_dir.join(opml_name);
        storage::write_atomic(&opml_path, rewritten.into_bytes()).await?;
        self.publisher.publish(&opml_path, self.bucket(), false).await?;

        let opml = OpmlDocument::parse(&original).context("Invalid remote OPML")?;
        let mut urls: Vec<String> = opml.outlines.into_iter().map(|o| o.xml_url).collect();
        urls.sort();

        let mut report = MirrorReport::default();
        for xml_url in urls {
            report.uploaded += self
                .mirror_feed(&xml_url)
                .await
                .with_context(|| format!("Failed to mirror {}", xml_url))?;
            report.feeds += 1;
        }

        info!(feeds = report.feeds, uploaded = report.uploaded, "Mirror finished");
        Ok(report)
    }

    /// Mirror one feed document; returns how many enclosures were uploaded
    async fn mirror_feed(&mut self, xml_url: &str) -> Result<usize> {
        let channel = feed_name_from_url(xml_url);
        info!(channel = %channel, "Mirroring feed");

        let xml = self.fetch_text(xml_url).await?;
        let mut doc = FeedDocument::from_xml(&xml)?;

        let mut uploaded = 0;
        for item in doc.items_mut() {
            let Some(enclosure) = item.enclosure.as_mut() else {
                continue;
            };
            let Some(file_name) = file_name_from_url(&enclosure.url) else {
                continue;
            };

            if !self.publisher.index().has_asset(&channel, &file_name) {
                let local = self.options.save_dir.join(&file_name);
                self.download(&enclosure.url, &local).await?;
                self.publisher.publish(&local, &channel, true).await?;
                uploaded += 1;
            }
            enclosure.url = self.publisher.asset_url(&channel, &file_name);
        }

        let cached = FeedDocument::load(&self.options.cache_dir.join(format!("{}.xml", channel))).await?;
        // Fetched items win over cached ones with the same guid
        let fresh = std::mem::take(doc.items_mut());
        *doc.items_mut() = merge(fresh, cached.items().to_vec());

        let path = self.options.save_dir.join(format!("{}.xml", channel));
        doc.save(&path).await?;
        self.publisher.publish(&path, self.bucket(), false).await?;

        Ok(uploaded)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to fetch {}", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read {}", url))
    }

    /// Stream a remote file to disk
    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        debug!(url = %url, path = %path.display(), "Downloading enclosure");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to download {}", url))?;

        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Point every URL on `remote_base` at `local_base`
pub fn rewrite_host(content: &str, remote_base: &str, local_base: &str) -> String {
    content.replace(
        remote_base.trim_end_matches('/'),
        local_base.trim_end_matches('/'),
    )
}

/// Last path segment of a URL
pub fn file_name_from_url(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    url.path_segments()?
        .last()
        .filter(|s| !s.is_empty())
        .map(String::from)
}
