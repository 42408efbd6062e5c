//! Local state file helpers.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

/// Replace `path` with `content` via a temp file in the same directory
///
/// Readers never observe a half-written file; a failed write leaves the
/// previous content in place.
pub async fn write_atomic(path: &Path, content: Vec<u8>) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        temp.write_all(&content)
            .with_context(|| format!("Failed to write temp file for {}", target.display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync temp file for {}", target.display()))?;
        temp.persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", target.display()))?;
        Ok(())
    })
    .await
    .context("Atomic write task panicked")?
}

/// Read a file, `None` when it does not exist
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/state.json");

        write_atomic(&path, b"[1]".to_vec()).await.unwrap();
        write_atomic(&path, b"[1,2]".to_vec()).await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some("[1,2]"));

        // Only the target remains, no temp files
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_optional(&temp.path().join("nope.json")).await.unwrap().is_none());
    }
}
