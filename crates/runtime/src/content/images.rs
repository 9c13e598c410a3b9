//! Resolving image blocks to files on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use mcp::Media;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Where inline image payloads are written.
///
/// Files are created once and never overwritten. Removing them is left to
/// the caller.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write decoded bytes to a new file named from the current time, the
    /// block index, and a process-wide sequence number.
    pub async fn write(
        &self,
        bytes: &[u8],
        mime_type: &str,
        index: usize,
    ) -> std::io::Result<PathBuf> {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let ext = extension_for(mime_type);
        let path = self
            .dir
            .join(format!("mcp-image-{millis}-{index}-{seq}.{ext}"));

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = bytes.len(), "materialized inline image");
        Ok(path)
    }

    /// Find a readable file for an image block.
    ///
    /// Tries the explicit file path, then a `file://`-stripped URI, then
    /// the inline payload written to a new file. A candidate that fails is
    /// logged and the next one is tried.
    pub async fn resolve(&self, media: &Media, index: usize) -> Option<PathBuf> {
        if let Some(path) = media.file_path.as_deref() {
            if exists(path).await {
                return Some(PathBuf::from(path));
            }
            debug!(path, "image file path not found, trying next source");
        }

        if let Some(uri) = media.uri.as_deref() {
            let path = uri.strip_prefix("file://").unwrap_or(uri);
            if exists(path).await {
                return Some(PathBuf::from(path));
            }
            debug!(uri, "image uri does not name a local file, trying next source");
        }

        let data = media.data.as_deref()?;
        let bytes = match BASE64_STANDARD.decode(data.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("inline image is not valid base64: {e}");
                return None;
            }
        };
        match self.write(&bytes, &media.mime_type, index).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(dir = %self.dir.display(), "failed to write inline image: {e}");
                None
            }
        }
    }
}

async fn exists(path: &str) -> bool {
    !path.is_empty() && tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn extension_for(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/svg+xml" => "svg",
        other => other
            .strip_prefix("image/")
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin"),
    }
}
