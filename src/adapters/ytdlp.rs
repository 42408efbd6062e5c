//! Entry probing through yt-dlp.
//!
//! Runs `yt-dlp --dump-json` for a single video and reads live status,
//! duration and availability from its metadata. Failures are sorted into
//! "content is gone", "try again later" and "we are blocked".

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::EntryProber;
use crate::domain::{EntryProbe, LiveStatus, Platform, RemoteEntry};

/// stderr fragments meaning the platform refuses to serve us at all
const BLOCKED_MARKERS: &[&str] = &[
    "Sign in to confirm",
    "HTTP Error 429",
    "HTTP Error 412",
];

/// stderr fragments meaning the content no longer exists
const UNAVAILABLE_MARKERS: &[&str] = &[
    "HTTP Error 404",
    "HTTPError 404",
    "Video unavailable",
    "has been removed",
    "Private video",
    "This video is private",
];

/// stderr fragments meaning a stream has not started yet
const UPCOMING_MARKERS: &[&str] = &["This live event will begin", "Premieres in"];

/// Errors raised while probing an entry
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Content is gone; the entry is recorded and never downloaded
    #[error("Content unavailable: {0}")]
    Unavailable(String),

    /// Temporary failure; the entry stays unprocessed
    #[error("Probe failed: {0}")]
    Transient(String),

    /// Platform is blocking requests; the run must stop
    #[error("Blocked by platform: {0}")]
    Blocked(String),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// Prober could not be started at all
    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Whether the whole run must abort
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::Spawn { .. })
    }
}

/// Prober using the yt-dlp CLI
pub struct YtDlpProber {
    binary_path: String,
    cookie_file: Option<PathBuf>,
    probe_timeout: Duration,
}

impl Default for YtDlpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpProber {
    pub fn new() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            cookie_file: None,
            probe_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }

    /// Cookies passed for Bilibili probes when the file exists
    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    fn args(&self, platform: Platform, link: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--ignore-no-formats-error".to_string(),
            "--no-warnings".to_string(),
        ];
        if platform == Platform::Bilibili {
            if let Some(cookies) = self.cookie_file.as_ref().filter(|p| p.exists()) {
                args.push("--cookies".to_string());
                args.push(cookies.display().to_string());
            }
        }
        args.push(link.to_string());
        args
    }
}

#[async_trait]
impl EntryProber for YtDlpProber {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(skip(self, entry), fields(vid = %entry.id))]
    async fn probe(&self, platform: Platform, entry: &RemoteEntry) -> Result<EntryProbe, ProbeError> {
        let child = Command::new(&self.binary_path)
            .args(self.args(platform, &entry.link))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                binary: self.binary_path.clone(),
                source,
            })?;

        let output = timeout(self.probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(self.probe_timeout))?
            .map_err(|e| ProbeError::Transient(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let error = classify_failure(platform, stderr.trim());
            warn!(exit_code = output.status.code().unwrap_or(-1), error = %error, "Probe failed");
            return match error {
                ProbeError::Unavailable(_) => Ok(EntryProbe::unavailable()),
                other if is_upcoming(&stderr) => {
                    debug!(error = %other, "Treating probe failure as upcoming stream");
                    Ok(EntryProbe {
                        live_status: LiveStatus::IsUpcoming,
                        ..Default::default()
                    })
                }
                other => Err(other),
            };
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn is_upcoming(stderr: &str) -> bool {
    UPCOMING_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Sort a failed probe by its stderr
///
/// Bilibili reports removed or region-locked videos with assorted download
/// errors, so any non-blocking failure there counts as unavailable.
pub fn classify_failure(platform: Platform, stderr: &str) -> ProbeError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or(stderr)
        .to_string();

    if BLOCKED_MARKERS.iter().any(|m| stderr.contains(m)) {
        return ProbeError::Blocked(message);
    }
    if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        return ProbeError::Unavailable(message);
    }
    match platform {
        Platform::Bilibili if !is_upcoming(stderr) => ProbeError::Unavailable(message),
        _ => ProbeError::Transient(message),
    }
}

/// Parse the JSON document yt-dlp prints for one video
pub fn parse_probe_output(stdout: &str) -> Result<EntryProbe, ProbeError> {
    let line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or_else(|| ProbeError::Transient("yt-dlp printed no metadata".to_string()))?;

    serde_json::from_str(line)
        .map_err(|e| ProbeError::Transient(format!("Invalid yt-dlp metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_is_fatal() {
        let err = classify_failure(
            Platform::Youtube,
            "ERROR: [youtube] abc: Sign in to confirm you're not a bot",
        );
        assert!(matches!(err, ProbeError::Blocked(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_removed_is_unavailable() {
        let err = classify_failure(
            Platform::Youtube,
            "WARNING: something\nERROR: [youtube] abc: Video unavailable",
        );
        assert!(matches!(err, ProbeError::Unavailable(ref m) if m.contains("Video unavailable")));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_platform_specific_fallback() {
        let stderr = "ERROR: [BiliBili] BV1: unable to extract playinfo";
        assert!(matches!(
            classify_failure(Platform::Bilibili, stderr),
            ProbeError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure(Platform::Youtube, stderr),
            ProbeError::Transient(_)
        ));
    }

    #[test]
    fn test_parse_probe_output() {
        let stdout = "{\"id\": \"abc\", \"duration\": 42, \"live_status\": \"not_live\", \"availability\": null}\n";
        let probe = parse_probe_output(stdout).unwrap();
        assert_eq!(probe.duration_seconds, Some(42.0));
        assert_eq!(probe.live_status, LiveStatus::NotLive);
        assert!(probe.availability.is_none());
    }

    #[test]
    fn test_empty_output_is_transient() {
        assert!(matches!(parse_probe_output(""), Err(ProbeError::Transient(_))));
    }

    #[test]
    fn test_cookies_only_for_bilibili_when_present() {
        let temp = tempfile::TempDir::new().unwrap();
        let cookies = temp.path().join("cookie.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();

        let prober = YtDlpProber::new().with_cookie_file(&cookies);
        let bili = prober.args(Platform::Bilibili, "https://b23.tv/x");
        assert!(bili.contains(&"--cookies".to_string()));
        assert_eq!(bili.last().map(String::as_str), Some("https://b23.tv/x"));

        let yt = prober.args(Platform::Youtube, "https://youtu.be/x");
        assert!(!yt.contains(&"--cookies".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let prober = YtDlpProber::new().with_binary_path("/nonexistent/yt-dlp");
        let entry = RemoteEntry::new("abc", "t", "https://youtu.be/abc");
        let err = prober.probe(Platform::Youtube, &entry).await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
        assert!(err.is_fatal());
    }
}
