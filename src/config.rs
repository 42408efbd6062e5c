//! Runtime settings for podsync.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (GITHUB_REPOSITORY, GITHUB_TOKEN, RSSHUB_URL,
//!    DEFAULT_TG_TARGET, PODSYNC_*)
//! 2. Config file (.podsync/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .podsync/config.yaml
//! - Paths in config file are relative to the directory holding .podsync/
//!
//! Per-feed options live in separate JSON files (see [`crate::domain::FeedConfig`]).

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached settings (stores Result to handle init errors)
static SETTINGS: OnceLock<Result<Settings, String>> = OnceLock::new();

pub const DEFAULT_RSSHUB_URL: &str = "https://rsshub.app";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub rsshub_url: Option<String>,
    pub default_tg_target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubConfig {
    /// `owner/repo` hosting the release buckets
    pub repository: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `<platform>.json` feed configs
    pub config_dir: Option<String>,
    /// Directory holding processed records
    pub metadata_dir: Option<String>,
    /// Working directory for downloads and feed documents
    pub work_dir: Option<String>,
    /// Netscape cookie file handed to yt-dlp
    pub cookie_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub ytdlp: Option<String>,
    pub downloader: Option<String>,
    pub gh: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsConfig {
    pub http_seconds: Option<u64>,
    pub probe_seconds: Option<u64>,
    pub download_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionConfig {
    pub keep_assets: Option<usize>,
    pub keep_items: Option<usize>,
}

/// Timeouts applied to external calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub http: Duration,
    pub probe: Duration,
    pub download: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            http: Duration::from_secs(30),
            probe: Duration::from_secs(120),
            download: Duration::from_secs(3600),
        }
    }
}

/// CookieCloud credentials used by the `cookies` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieCloudSettings {
    pub server: Option<String>,
    pub key: Option<String>,
    pub password: Option<String>,
}

/// Resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub repository: Option<String>,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub rsshub_url: String,
    pub default_tg_target: Option<String>,
    pub config_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub work_dir: PathBuf,
    pub cookie_file: PathBuf,
    pub ytdlp_binary: String,
    pub downloader_binary: String,
    pub gh_binary: String,
    pub timeouts: Timeouts,
    /// Media assets kept per feed bucket by `clean-up`
    pub keep_assets: usize,
    /// Items kept per feed document by `prune`
    pub keep_items: usize,
    pub cookie_cloud: CookieCloudSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository: None,
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            rsshub_url: DEFAULT_RSSHUB_URL.to_string(),
            default_tg_target: None,
            config_dir: PathBuf::from("config"),
            metadata_dir: PathBuf::from("metadata"),
            work_dir: PathBuf::from("."),
            cookie_file: PathBuf::from("cookie.txt"),
            ytdlp_binary: "yt-dlp".to_string(),
            downloader_binary: "videogram".to_string(),
            gh_binary: "gh".to_string(),
            timeouts: Timeouts::default(),
            keep_assets: 40,
            keep_items: 100,
            cookie_cloud: CookieCloudSettings::default(),
            config_file: None,
        }
    }
}

impl Settings {
    /// Merge a config file and environment lookups over the defaults
    pub fn resolve<F>(file: Option<(&Path, ConfigFile)>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some((config_path, config)) = file {
            // Base directory is the parent of .podsync/
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));

            settings.config_file = Some(config_path.to_path_buf());
            settings.repository = config.github.repository;
            if let Some(url) = config.github.api_url {
                settings.github_api_url = url;
            }
            if let Some(url) = config.rsshub_url {
                settings.rsshub_url = url;
            }
            settings.default_tg_target = config.default_tg_target;

            if let Some(dir) = config.paths.config_dir {
                settings.config_dir = resolve_path(base_dir, &dir);
            }
            if let Some(dir) = config.paths.metadata_dir {
                settings.metadata_dir = resolve_path(base_dir, &dir);
            }
            if let Some(dir) = config.paths.work_dir {
                settings.work_dir = resolve_path(base_dir, &dir);
            }
            if let Some(file) = config.paths.cookie_file {
                settings.cookie_file = resolve_path(base_dir, &file);
            }

            if let Some(bin) = config.tools.ytdlp {
                settings.ytdlp_binary = bin;
            }
            if let Some(bin) = config.tools.downloader {
                settings.downloader_binary = bin;
            }
            if let Some(bin) = config.tools.gh {
                settings.gh_binary = bin;
            }

            if let Some(secs) = config.timeouts.http_seconds {
                settings.timeouts.http = Duration::from_secs(secs);
            }
            if let Some(secs) = config.timeouts.probe_seconds {
                settings.timeouts.probe = Duration::from_secs(secs);
            }
            if let Some(secs) = config.timeouts.download_seconds {
                settings.timeouts.download = Duration::from_secs(secs);
            }

            if let Some(keep) = config.retention.keep_assets {
                settings.keep_assets = keep;
            }
            if let Some(keep) = config.retention.keep_items {
                settings.keep_items = keep;
            }
        }

        // Environment wins over the config file
        if let Some(repo) = lookup("GITHUB_REPOSITORY") {
            settings.repository = Some(repo);
        }
        settings.github_token = lookup("GITHUB_TOKEN");
        if let Some(url) = lookup("PODSYNC_GITHUB_API_URL") {
            settings.github_api_url = url;
        }
        if let Some(url) = lookup("RSSHUB_URL") {
            settings.rsshub_url = url;
        }
        if let Some(target) = lookup("DEFAULT_TG_TARGET") {
            settings.default_tg_target = Some(target);
        }
        if let Some(dir) = lookup("PODSYNC_CONFIG_DIR") {
            settings.config_dir = paths::expand_tilde(&dir);
        }
        if let Some(dir) = lookup("PODSYNC_METADATA_DIR") {
            settings.metadata_dir = paths::expand_tilde(&dir);
        }
        if let Some(dir) = lookup("PODSYNC_WORK_DIR") {
            settings.work_dir = paths::expand_tilde(&dir);
        }
        if let Some(file) = lookup("PODSYNC_COOKIE_FILE") {
            settings.cookie_file = paths::expand_tilde(&file);
        }
        if let Some(bin) = lookup("PODSYNC_YTDLP") {
            settings.ytdlp_binary = bin;
        }
        if let Some(bin) = lookup("PODSYNC_DOWNLOADER") {
            settings.downloader_binary = bin;
        }
        if let Some(bin) = lookup("PODSYNC_GH") {
            settings.gh_binary = bin;
        }

        settings.cookie_cloud = CookieCloudSettings {
            server: lookup("COOKIE_CLOUD_SERVER"),
            key: lookup("COOKIE_CLOUD_KEY"),
            password: lookup("COOKIE_CLOUD_PASS"),
        };

        settings
    }

    /// Repository slug, required by anything that touches releases
    pub fn require_repository(&self) -> Result<&str> {
        self.repository
            .as_deref()
            .context("GITHUB_REPOSITORY is not set (env or .podsync/config.yaml github.repository)")
    }

    /// Default feed config file for a platform
    pub fn feed_config_path(&self, platform: crate::domain::Platform) -> PathBuf {
        self.config_dir.join(format!("{}.json", platform.as_str()))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".podsync").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = paths::expand_tilde(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load settings from all sources
fn load_settings() -> Result<Settings> {
    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(Settings::resolve(
        file.as_ref().map(|(p, c)| (p.as_path(), c.clone())),
        |key| std::env::var(key).ok(),
    ))
}

/// Get the global settings (loads once, then cached)
pub fn settings() -> Result<&'static Settings> {
    let result = SETTINGS.get_or_init(|| load_settings().map_err(|e| e.to_string()));

    match result {
        Ok(settings) => Ok(settings),
        Err(e) => anyhow::bail!("{}", e),
    }
}
