//! Canonical on-disk layout for podsync state.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `config/<platform>.json` | Feed configs (read-only) |
//! | `metadata/<name>.json` | Processed records, mirrored to the `metadata` bucket |
//! | `audio/<name>.xml`, `video/<name>.xml` | Feed documents |
//! | `audio/podsync.opml`, `video/podsync.opml` | OPML indexes |

use std::path::{Path, PathBuf};

use crate::domain::MediaKind;

/// Release bucket holding processed-record files
pub const METADATA_BUCKET: &str = "metadata";

/// OPML file name inside each kind directory
pub const OPML_FILE: &str = "podsync.opml";

/// Leftover files are matched on this many leading title characters
pub const LEFTOVER_PREFIX_CHARS: usize = 60;

/// Processed-record file for a feed
pub fn metadata_file(metadata_dir: &Path, feed_name: &str) -> PathBuf {
    metadata_dir.join(format!("{}.json", feed_name))
}

/// Feed document for a feed and media kind
pub fn document_file(work_dir: &Path, kind: MediaKind, feed_name: &str) -> PathBuf {
    work_dir.join(kind.as_str()).join(kind.document_name(feed_name))
}

/// OPML index for a media kind
pub fn opml_file(work_dir: &Path, kind: MediaKind) -> PathBuf {
    work_dir.join(kind.as_str()).join(OPML_FILE)
}

/// Glob pattern matching files left behind by the downloader for a title
///
/// A blank title has no pattern; `<dir>/.*` would match every dotfile.
pub fn leftover_pattern(work_dir: &Path, title: &str) -> Option<String> {
    if title.trim().is_empty() {
        return None;
    }
    let prefix: String = title.chars().take(LEFTOVER_PREFIX_CHARS).collect();
    let escaped = glob::Pattern::escape(&prefix);
    Some(format!("{}/{}.*", work_dir.display(), escaped))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_locations() {
        let root = Path::new("/work");
        assert_eq!(
            metadata_file(&root.join("metadata"), "lex"),
            PathBuf::from("/work/metadata/lex.json")
        );
        assert_eq!(
            document_file(root, MediaKind::Video, "lex"),
            PathBuf::from("/work/video/lex.xml")
        );
        assert_eq!(
            opml_file(root, MediaKind::Audio),
            PathBuf::from("/work/audio/podsync.opml")
        );
    }

    #[test]
    fn test_leftover_pattern_truncates_and_escapes() {
        let title = "a".repeat(80) + "[live]";
        let pattern = leftover_pattern(Path::new("/dl"), &title);
        assert_eq!(pattern, Some(format!("/dl/{}.*", "a".repeat(60))));

        let pattern = leftover_pattern(Path::new("/dl"), "Episode [1]?");
        assert_eq!(pattern.as_deref(), Some("/dl/Episode [[]1[]][?].*"));
    }

    #[test]
    fn test_leftover_pattern_skips_blank_titles() {
        assert_eq!(leftover_pattern(Path::new("/dl"), ""), None);
        assert_eq!(leftover_pattern(Path::new("/dl"), "  "), None);
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/cookie.txt"), home.join("cookie.txt"));
        assert_eq!(expand_tilde("/abs/cookie.txt"), PathBuf::from("/abs/cookie.txt"));
        assert_eq!(expand_tilde("rel"), PathBuf::from("rel"));
    }
}
