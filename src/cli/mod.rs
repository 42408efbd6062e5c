//! Command-line interface for podsync.
//!
//! `sync` runs the pipeline for one feed, `check` is the poll-only
//! scheduler, the rest are maintenance commands over published state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{
    ArtifactStore, CookieCloudClient, GitHubReleases, HttpFeedSource, VideogramDownloader,
    YtDlpProber,
};
use crate::config::{self, Settings};
use crate::core::{
    Mirror, MirrorOptions, PipelineAdapters, PipelineOptions, Publisher, Scheduler, SyncPipeline,
};
use crate::domain::{FeedConfig, MediaKind, Platform};

pub mod maintenance;

/// podsync - Mirror YouTube and Bilibili channels as podcast feeds
#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync one feed: download new entries and republish its podcast feeds
    Sync {
        /// Platform of the feed
        #[arg(short, long, value_enum, default_value = "youtube")]
        platform: Platform,

        /// Feed name from the platform config
        #[arg(short, long)]
        name: String,

        /// Feed config file (defaults to config/<platform>.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding processed records
        #[arg(long)]
        metadata_dir: Option<PathBuf>,
    },

    /// Check every feed of a platform and dispatch sync runs for new entries
    Check {
        #[arg(short, long, value_enum, default_value = "youtube")]
        platform: Platform,

        /// Feed config file (defaults to config/<platform>.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Rebuild the OPML indexes when the set of feeds changed
    RefreshOpml,

    /// Delete expired media assets from feed buckets
    CleanUp {
        #[arg(short, long, value_enum, default_value = "youtube")]
        platform: Platform,

        /// Media assets kept per bucket (defaults to settings)
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Cap feed documents to their newest items
    Prune {
        /// Items kept per document (defaults to settings)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Only prune documents of this kind
        #[arg(long, value_enum)]
        kind: Option<MediaKind>,
    },

    /// Remove duplicate items from feed documents
    Dedup {
        /// Only deduplicate documents of this kind
        #[arg(long, value_enum)]
        kind: Option<MediaKind>,
    },

    /// Drop processed records whose media never reached the bucket
    PruneFailed {
        #[arg(short, long, value_enum, default_value = "youtube")]
        platform: Platform,

        /// Only reconcile this feed
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Mirror the feeds of another podsync server
    Mirror {
        #[arg(long)]
        remote_host: String,

        /// OPML path on the remote host
        #[arg(long)]
        remote_path: String,

        #[arg(long, value_enum, default_value = "audio")]
        pod_type: MediaKind,

        #[arg(long, default_value = ".")]
        save_dir: PathBuf,

        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,
    },

    /// Export downloader cookies from a CookieCloud server
    Cookies {
        /// Only cookies of domains ending with this are exported
        #[arg(long, default_value = "bilibili.com")]
        root_domain: String,

        /// Cookie file (defaults to settings)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip host-only cookies
        #[arg(long)]
        no_subdomain: bool,

        /// Overwrite an existing cookie file
        #[arg(short, long)]
        force: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Sync {
                platform,
                name,
                config,
                metadata_dir,
            } => sync_feed(platform, &name, config, metadata_dir).await,
            Commands::Check { platform, config } => check_feeds(platform, config).await,
            Commands::RefreshOpml => maintenance::execute_refresh_opml().await,
            Commands::CleanUp { platform, keep } => {
                maintenance::execute_clean_up(platform, keep).await
            }
            Commands::Prune { keep, kind } => maintenance::execute_prune(keep, kind).await,
            Commands::Dedup { kind } => maintenance::execute_dedup(kind).await,
            Commands::PruneFailed { platform, name } => {
                maintenance::execute_prune_failed(platform, name.as_deref()).await
            }
            Commands::Mirror {
                remote_host,
                remote_path,
                pod_type,
                save_dir,
                cache_dir,
            } => {
                let options =
                    MirrorOptions::new(remote_host, remote_path, pod_type, save_dir, cache_dir);
                mirror(options).await
            }
            Commands::Cookies {
                root_domain,
                output,
                no_subdomain,
                force,
            } => export_cookies(&root_domain, output, no_subdomain, force).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Artifact store backed by the repository's releases
pub(crate) fn artifact_store(settings: &Settings) -> Result<Arc<dyn ArtifactStore>> {
    Ok(Arc::new(GitHubReleases::from_settings(settings)?))
}

/// Load every feed of a platform; `None` when the config file does not exist
pub(crate) fn load_feeds(
    settings: &Settings,
    platform: Platform,
    config: Option<PathBuf>,
) -> Result<Option<Vec<FeedConfig>>> {
    let path = config.unwrap_or_else(|| settings.feed_config_path(platform));
    if !path.exists() {
        warn!(path = %path.display(), "Feed config not found");
        return Ok(None);
    }
    Ok(Some(FeedConfig::load_all(&path)?))
}

/// Feeds of every platform that has a config file, paired with their platform
pub(crate) fn load_all_platforms(settings: &Settings) -> Result<Vec<(Platform, FeedConfig)>> {
    let mut feeds = Vec::new();
    for platform in [Platform::Youtube, Platform::Bilibili] {
        if let Some(configs) = load_feeds(settings, platform, None)? {
            feeds.extend(configs.into_iter().map(|c| (platform, c)));
        }
    }
    Ok(feeds)
}

/// Run the sync pipeline for one feed
async fn sync_feed(
    platform: Platform,
    name: &str,
    config: Option<PathBuf>,
    metadata_dir: Option<PathBuf>,
) -> Result<()> {
    let settings = config::settings()?;

    let config_path = config.unwrap_or_else(|| settings.feed_config_path(platform));
    let feed = FeedConfig::load(&config_path, name)
        .with_context(|| format!("Failed to load feed {}", name))?;

    let adapters = PipelineAdapters {
        source: Arc::new(HttpFeedSource::new(
            settings.rsshub_url.clone(),
            settings.timeouts.http,
        )?),
        prober: Arc::new(
            YtDlpProber::new()
                .with_binary_path(settings.ytdlp_binary.clone())
                .with_cookie_file(settings.cookie_file.clone())
                .with_timeout(settings.timeouts.probe),
        ),
        downloader: Arc::new(
            VideogramDownloader::new()
                .with_binary_path(settings.downloader_binary.clone())
                .with_work_dir(settings.work_dir.clone())
                .with_timeout(settings.timeouts.download),
        ),
        store: artifact_store(settings)?,
    };

    let mut options = PipelineOptions::from_settings(settings);
    if let Some(dir) = metadata_dir {
        options.metadata_dir = dir;
    }

    let pipeline = SyncPipeline::new(platform, feed, adapters, options);
    let report = pipeline.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Poll every feed of a platform and trigger runs
async fn check_feeds(platform: Platform, config: Option<PathBuf>) -> Result<()> {
    let settings = config::settings()?;

    let Some(feeds) = load_feeds(settings, platform, config)? else {
        return Ok(());
    };

    let source = Arc::new(HttpFeedSource::new(
        settings.rsshub_url.clone(),
        settings.timeouts.http,
    )?);
    let trigger = Arc::new(GitHubReleases::from_settings(settings)?);
    let scheduler = Scheduler::new(platform, source, trigger);

    let report = scheduler.check_all(&feeds, &settings.metadata_dir).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Mirror a foreign podsync server into the local store
async fn mirror(options: MirrorOptions) -> Result<()> {
    let settings = config::settings()?;

    tokio::fs::create_dir_all(&options.save_dir)
        .await
        .with_context(|| format!("Failed to create {}", options.save_dir.display()))?;

    let publisher = Publisher::connect(artifact_store(settings)?).await?;
    let mut mirror = Mirror::new(publisher, options, settings.timeouts.http)?;
    let report = mirror.run().await?;

    println!("Mirrored {} feeds, uploaded {} files", report.feeds, report.uploaded);
    Ok(())
}

/// Write the downloader cookie file
async fn export_cookies(
    root_domain: &str,
    output: Option<PathBuf>,
    no_subdomain: bool,
    force: bool,
) -> Result<()> {
    let settings = config::settings()?;
    let path = output.unwrap_or_else(|| settings.cookie_file.clone());

    let client = CookieCloudClient::from_settings(&settings.cookie_cloud, settings.timeouts.http)?;
    if client.export(&path, root_domain, no_subdomain, force).await? {
        info!(path = %path.display(), "Cookie file written");
    }
    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let settings = config::settings()?;

    println!("Config file: {}", display_optional_path(settings.config_file.as_deref()));
    println!();
    println!("GitHub:");
    println!("  Repository: {}", settings.repository.as_deref().unwrap_or("(not set)"));
    println!("  Token:      {}", if settings.github_token.is_some() { "(set)" } else { "(not set)" });
    println!("  API:        {}", settings.github_api_url);
    println!();
    println!("Paths:");
    println!("  Feed configs: {}", settings.config_dir.display());
    println!("  Metadata:     {}", settings.metadata_dir.display());
    println!("  Work dir:     {}", settings.work_dir.display());
    println!("  Cookie file:  {}", settings.cookie_file.display());
    println!();
    println!("Feed configs:");
    for platform in [Platform::Youtube, Platform::Bilibili] {
        let path = settings.feed_config_path(platform);
        let status = if path.exists() { "" } else { " (missing)" };
        println!("  {}: {}{}", platform, path.display(), status);
    }
    println!();
    println!("Tools:");
    println!("  yt-dlp:     {}", settings.ytdlp_binary);
    println!("  Downloader: {}", settings.downloader_binary);
    println!("  gh:         {}", settings.gh_binary);
    println!();
    println!("Timeouts:");
    println!("  HTTP:     {}s", settings.timeouts.http.as_secs());
    println!("  Probe:    {}s", settings.timeouts.probe.as_secs());
    println!("  Download: {}s", settings.timeouts.download.as_secs());
    println!();
    println!("Retention:");
    println!("  Assets per bucket:  {}", settings.keep_assets);
    println!("  Items per document: {}", settings.keep_items);
    println!();
    println!("RSSHub: {}", settings.rsshub_url);
    println!(
        "Default chat target: {}",
        settings.default_tg_target.as_deref().unwrap_or("(none)")
    );

    Ok(())
}

fn display_optional_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string())
}

/// Names of feeds keyed to their platform
pub(crate) fn platform_by_name(feeds: &[(Platform, FeedConfig)]) -> HashMap<String, Platform> {
    feeds.iter().map(|(p, f)| (f.name.clone(), *p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_arguments() {
        let cli = Cli::try_parse_from([
            "podsync", "--log-level", "debug", "sync", "-p", "bilibili", "-n", "lex",
            "--metadata-dir", "/tmp/meta",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Sync {
                platform,
                name,
                config,
                metadata_dir,
            } => {
                assert_eq!(platform, Platform::Bilibili);
                assert_eq!(name, "lex");
                assert!(config.is_none());
                assert_eq!(metadata_dir, Some(PathBuf::from("/tmp/meta")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_mirror_defaults() {
        let cli = Cli::try_parse_from([
            "podsync", "mirror", "--remote-host", "pods.example.com", "--remote-path",
            "audio/podsync.opml",
        ])
        .unwrap();

        match cli.command {
            Commands::Mirror {
                pod_type,
                save_dir,
                cache_dir,
                ..
            } => {
                assert_eq!(pod_type, MediaKind::Audio);
                assert_eq!(save_dir, PathBuf::from("."));
                assert_eq!(cache_dir, PathBuf::from("cache"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sync_requires_name() {
        assert!(Cli::try_parse_from(["podsync", "sync"]).is_err());
    }
}
