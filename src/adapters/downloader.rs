//! Download delegate backed by an external sync utility.
//!
//! The utility downloads and transcodes one video, mirrors it to a chat
//! target and prints a JSON summary of the produced files:
//!
//! ```text
//! videogram <url> --tg-id <target> [--no-audio] [--no-video] --json
//! {"title": "...", "audio_info": [{"audio_path": "...", "duration": 61}],
//!  "video_info": [{"video_path": "...", "duration": 61}]}
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, instrument};

use super::DownloadDelegate;
use crate::domain::{DownloadResult, MediaPart};

/// stderr fragments meaning the platform refuses to serve us
const BLOCKED_MARKERS: &[&str] = &["Sign in to confirm", "HTTP Error 429"];

/// Errors raised by the download delegate
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Blocked by platform: {0}")]
    Blocked(String),

    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid downloader output: {0}")]
    InvalidOutput(String),

    #[error("Downloaded file missing: {0}")]
    MissingFile(PathBuf),
}

impl DownloadError {
    /// Whether the whole run must abort
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::Spawn { .. })
    }
}

/// What to download for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub tg_target: Option<String>,
    pub audio: bool,
    pub video: bool,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    audio_info: Vec<RawAudio>,
    #[serde(default)]
    video_info: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
struct RawAudio {
    audio_path: PathBuf,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    video_path: PathBuf,
    #[serde(default)]
    duration: f64,
}

/// Delegate invoking the `videogram` CLI
pub struct VideogramDownloader {
    binary_path: String,
    work_dir: PathBuf,
    download_timeout: Duration,
}

impl Default for VideogramDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideogramDownloader {
    pub fn new() -> Self {
        Self {
            binary_path: "videogram".to_string(),
            work_dir: PathBuf::from("."),
            download_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }

    /// Directory the utility runs in; relative output paths resolve against it
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_timeout(mut self, download_timeout: Duration) -> Self {
        self.download_timeout = download_timeout;
        self
    }

    fn args(request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![request.url.clone()];
        if let Some(target) = &request.tg_target {
            args.push("--tg-id".to_string());
            args.push(target.clone());
        }
        if !request.audio {
            args.push("--no-audio".to_string());
        }
        if !request.video {
            args.push("--no-video".to_string());
        }
        args.push("--json".to_string());
        args
    }
}

#[async_trait]
impl DownloadDelegate for VideogramDownloader {
    fn name(&self) -> &str {
        "videogram"
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, DownloadError> {
        info!(audio = request.audio, video = request.video, "Starting download");

        let child = Command::new(&self.binary_path)
            .args(Self::args(request))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Spawn {
                binary: self.binary_path.clone(),
                source,
            })?;

        let output = timeout(self.download_timeout, child.wait_with_output())
            .await
            .map_err(|_| DownloadError::Timeout(self.download_timeout))?
            .map_err(|e| DownloadError::Failed {
                code: -1,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if BLOCKED_MARKERS.iter().any(|m| stderr.contains(m)) {
                return Err(DownloadError::Blocked(stderr));
            }
            return Err(DownloadError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let result = parse_output(&String::from_utf8_lossy(&output.stdout), &self.work_dir)?;
        for path in result.all_paths() {
            if !path.exists() {
                return Err(DownloadError::MissingFile(path.clone()));
            }
        }

        info!(
            title = %result.title,
            audio_parts = result.audio.len(),
            video_parts = result.video.len(),
            "Download finished"
        );
        Ok(result)
    }
}

/// Parse the JSON summary printed by the utility
///
/// The summary is the last JSON object on stdout; progress lines before
/// it are ignored.
pub fn parse_output(stdout: &str, work_dir: &Path) -> Result<DownloadResult, DownloadError> {
    let json = stdout
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or_else(|| DownloadError::InvalidOutput("no JSON summary on stdout".to_string()))?;

    let raw: RawOutput =
        serde_json::from_str(json).map_err(|e| DownloadError::InvalidOutput(e.to_string()))?;

    let resolve = |p: PathBuf| if p.is_absolute() { p } else { work_dir.join(p) };

    Ok(DownloadResult {
        title: raw.title,
        audio: raw
            .audio_info
            .into_iter()
            .map(|a| Ok(MediaPart::new(resolve(a.audio_path), whole_seconds(a.duration)?)))
            .collect::<Result<Vec<_>, DownloadError>>()?,
        video: raw
            .video_info
            .into_iter()
            .map(|v| Ok(MediaPart::new(resolve(v.video_path), whole_seconds(v.duration)?)))
            .collect::<Result<Vec<_>, DownloadError>>()?,
    })
}

/// Round a reported duration to whole seconds
fn whole_seconds(duration: f64) -> Result<u64, DownloadError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(DownloadError::InvalidOutput(format!(
            "invalid media duration: {}",
            duration
        )));
    }
    Ok(duration.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_follow_flags() {
        let request = DownloadRequest {
            url: "https://youtu.be/abc".to_string(),
            tg_target: Some("@chan".to_string()),
            audio: true,
            video: false,
        };
        assert_eq!(
            VideogramDownloader::args(&request),
            vec!["https://youtu.be/abc", "--tg-id", "@chan", "--no-video", "--json"]
        );
    }

    #[test]
    fn test_parse_output_with_progress_lines() {
        let stdout = r#"[download] 100% of 10MiB
{"title": "Talk", "audio_info": [{"audio_path": "Talk.m4a", "duration": 61.4}], "video_info": [{"video_path": "/abs/Talk.mp4", "duration": 61}]}
"#;
        let result = parse_output(stdout, Path::new("/work")).unwrap();

        assert_eq!(result.title, "Talk");
        assert_eq!(result.audio[0].path, PathBuf::from("/work/Talk.m4a"));
        assert_eq!(result.audio[0].duration_seconds, 61);
        assert_eq!(result.video[0].path, PathBuf::from("/abs/Talk.mp4"));
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let result = parse_output(r#"{"title": "Only audio"}"#, Path::new(".")).unwrap();
        assert!(result.audio.is_empty());
        assert!(result.video.is_empty());
    }

    #[test]
    fn test_negative_duration_is_invalid() {
        let stdout = r#"{"title": "Talk", "audio_info": [{"audio_path": "Talk.m4a", "duration": -3.0}]}"#;
        let err = parse_output(stdout, Path::new("/work")).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidOutput(ref m) if m.contains("-3")));
        assert!(!err.is_fatal());

        assert!(whole_seconds(f64::NAN).is_err());
        assert_eq!(whole_seconds(0.4).unwrap(), 0);
    }

    #[test]
    fn test_no_json_is_invalid() {
        let err = parse_output("all done", Path::new(".")).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidOutput(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let downloader = VideogramDownloader::new().with_binary_path("/nonexistent/videogram");
        let request = DownloadRequest {
            url: "https://youtu.be/abc".to_string(),
            tg_target: None,
            audio: true,
            video: true,
        };
        let err = downloader.download(&request).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
