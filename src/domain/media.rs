//! Downloaded media and the kinds of feeds built from it.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Podcast flavour; each kind has its own feed document and release bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Enclosure MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/x-m4a",
            Self::Video => "video/mp4",
        }
    }

    /// Release bucket holding this kind's feed documents and OPML
    pub fn bucket(&self) -> &'static str {
        self.as_str()
    }

    /// Feed document file name for a feed
    pub fn document_name(&self, feed_name: &str) -> String {
        format!("{}.xml", feed_name)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media file; split videos produce several parts
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPart {
    pub path: PathBuf,
    pub duration_seconds: u64,
}

impl MediaPart {
    pub fn new(path: impl Into<PathBuf>, duration_seconds: u64) -> Self {
        Self {
            path: path.into(),
            duration_seconds,
        }
    }
}

/// Files produced by the download delegate for one entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadResult {
    pub title: String,
    pub audio: Vec<MediaPart>,
    pub video: Vec<MediaPart>,
}

impl DownloadResult {
    pub fn parts(&self, kind: MediaKind) -> &[MediaPart] {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    pub fn parts_mut(&mut self, kind: MediaKind) -> &mut Vec<MediaPart> {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }

    /// Every local file of the download, audio first
    pub fn all_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.audio.iter().chain(self.video.iter()).map(|p| &p.path)
    }
}

/// Stem for the n-th (zero based) part of an entry: `vid`, `vid-P2`, ...
pub fn part_stem(vid: &str, index: usize) -> String {
    if index == 0 {
        vid.to_string()
    } else {
        format!("{}-P{}", vid, index + 1)
    }
}
