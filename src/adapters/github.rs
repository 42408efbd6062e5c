//! GitHub releases as the artifact store.
//!
//! Each bucket is a pre-release named after it. Listing, asset deletion and
//! workflow dispatch go through the REST API; release creation and uploads
//! go through the `gh` CLI, which handles large files and `--clobber`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::{ArtifactStore, Bucket, ReleaseAsset, WorkflowTrigger};
use crate::domain::Platform;

/// Maximum page size of the releases endpoint
const PER_PAGE: usize = 100;

const API_VERSION: &str = "2022-11-28";
const WORKFLOW_FILE: &str = "single.yml";
const WORKFLOW_REF: &str = "main";

/// Errors raised by the GitHub adapter
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("`{command}` failed: {stderr}")]
    Cli { command: String, stderr: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    name: Option<String>,
    tag_name: String,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    id: u64,
    name: String,
    updated_at: DateTime<Utc>,
}

impl From<RawRelease> for Bucket {
    fn from(release: RawRelease) -> Self {
        let name = release
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or(release.tag_name);
        Self {
            name,
            assets: release
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    id: a.id,
                    name: a.name,
                    updated_at: a.updated_at,
                })
                .collect(),
        }
    }
}

/// Release store of a single repository
pub struct GitHubReleases {
    client: reqwest::Client,
    repository: String,
    token: Option<String>,
    api_url: String,
    gh_binary: String,
    cli_timeout: Duration,
}

impl GitHubReleases {
    pub fn new(repository: impl Into<String>, token: Option<String>, http_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GITHUB_TOKEN contains invalid header characters")?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(http_timeout)
            .user_agent(concat!("podsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            client,
            repository: repository.into(),
            token,
            api_url: crate::config::DEFAULT_GITHUB_API_URL.to_string(),
            gh_binary: "gh".to_string(),
            cli_timeout: Duration::from_secs(1800),
        })
    }

    /// Build from resolved settings
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self> {
        let repository = settings.require_repository()?;
        Ok(Self::new(
            repository,
            settings.github_token.clone(),
            settings.timeouts.http,
        )?
        .with_api_url(settings.github_api_url.clone())
        .with_gh_binary(settings.gh_binary.clone()))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_gh_binary(mut self, gh_binary: impl Into<String>) -> Self {
        self.gh_binary = gh_binary.into();
        self
    }

    pub fn with_cli_timeout(mut self, cli_timeout: Duration) -> Self {
        self.cli_timeout = cli_timeout;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repository, path)
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<RawRelease>, GitHubError> {
        let response = self
            .client
            .get(self.repo_url("releases"))
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    fn create_args(&self, bucket: &str) -> Vec<String> {
        vec![
            "release".to_string(),
            "create".to_string(),
            bucket.to_string(),
            "--prerelease".to_string(),
            "-n".to_string(),
            bucket.to_string(),
            "-t".to_string(),
            bucket.to_string(),
            "-R".to_string(),
            self.repository.clone(),
        ]
    }

    fn upload_args(&self, bucket: &str, path: &Path) -> Vec<String> {
        vec![
            "release".to_string(),
            "upload".to_string(),
            "--clobber".to_string(),
            bucket.to_string(),
            "-R".to_string(),
            self.repository.clone(),
            "--".to_string(),
            path.display().to_string(),
        ]
    }

    async fn run_gh(&self, args: Vec<String>) -> Result<(), GitHubError> {
        let command = format!("{} {}", self.gh_binary, args.join(" "));
        debug!(command = %command, "Running gh");

        let mut cmd = Command::new(&self.gh_binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }

        let child = cmd.spawn().map_err(|e| GitHubError::Cli {
            command: command.clone(),
            stderr: e.to_string(),
        })?;

        let output = timeout(self.cli_timeout, child.wait_with_output())
            .await
            .map_err(|_| GitHubError::Timeout {
                command: command.clone(),
                timeout: self.cli_timeout,
            })?
            .map_err(|e| GitHubError::Cli {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GitHubError::Cli {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for GitHubReleases {
    fn name(&self) -> &str {
        "github-releases"
    }

    #[instrument(skip(self), fields(repo = %self.repository))]
    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets = Vec::new();
        let mut page = 1;

        loop {
            let releases = self
                .fetch_page(page)
                .await
                .with_context(|| format!("Failed to list releases (page {})", page))?;
            let count = releases.len();
            buckets.extend(releases.into_iter().map(Bucket::from));

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(count = buckets.len(), "Fetched releases");
        Ok(buckets)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        info!(bucket = %bucket, repo = %self.repository, "Creating release");
        self.run_gh(self.create_args(bucket))
            .await
            .with_context(|| format!("Failed to create release {}", bucket))
    }

    async fn upload(&self, bucket: &str, path: &Path) -> Result<()> {
        info!(
            bucket = %bucket,
            file = %path.file_name().unwrap_or_default().to_string_lossy(),
            "Uploading asset"
        );
        self.run_gh(self.upload_args(bucket, path))
            .await
            .with_context(|| format!("Failed to upload {} to {}", path.display(), bucket))
    }

    async fn delete_asset(&self, asset_id: u64) -> Result<()> {
        debug!(asset_id, repo = %self.repository, "Deleting asset");
        let response = self
            .client
            .delete(self.repo_url(&format!("releases/assets/{}", asset_id)))
            .send()
            .await
            .map_err(GitHubError::from)
            .with_context(|| format!("Failed to delete asset {}", asset_id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Status {
                status: status.as_u16(),
                body,
            })
            .with_context(|| format!("Failed to delete asset {}", asset_id));
        }
        Ok(())
    }

    fn asset_url(&self, bucket: &str, file_name: &str) -> String {
        asset_download_url(&self.repository, bucket, file_name)
    }
}

#[async_trait]
impl WorkflowTrigger for GitHubReleases {
    #[instrument(skip(self), fields(repo = %self.repository))]
    async fn trigger(&self, feed_name: &str, platform: Platform) -> Result<()> {
        info!(feed = %feed_name, platform = %platform, "Triggering workflow");

        let response = self
            .client
            .post(self.repo_url(&format!("actions/workflows/{}/dispatches", WORKFLOW_FILE)))
            .json(&json!({
                "ref": WORKFLOW_REF,
                "inputs": {"name": feed_name, "platform": platform.as_str()},
            }))
            .send()
            .await
            .map_err(GitHubError::from)
            .with_context(|| format!("Failed to trigger workflow for {}", feed_name))?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Status {
                status: status.as_u16(),
                body,
            })
            .with_context(|| format!("Failed to trigger workflow for {}", feed_name));
        }
        Ok(())
    }
}

/// Public download URL of a release asset
pub fn asset_download_url(repository: &str, bucket: &str, file_name: &str) -> String {
    format!(
        "https://github.com/{}/releases/download/{}/{}",
        repository, bucket, file_name
    )
}
