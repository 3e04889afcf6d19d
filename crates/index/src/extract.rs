//! Text extraction seam.
//!
//! Format-specific extraction lives outside this crate; the engine only needs
//! "text or nothing" within a deadline.

use std::{path::Path, time::Duration};

use tracing::{debug, warn};

#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
  /// Extract searchable text. Failures and timeouts yield an empty string.
  async fn extract(&self, path: &Path, timeout: Duration) -> String;
}

/// Reads plain text files, treating anything with NUL bytes as binary
#[derive(Debug, Clone)]
pub struct TextExtractor {
  max_bytes: u64,
}

impl TextExtractor {
  pub fn new(max_bytes: u64) -> Self {
    Self { max_bytes }
  }
}

impl Default for TextExtractor {
  fn default() -> Self {
    Self::new(10 * 1024 * 1024)
  }
}

fn read_text(path: &Path, max_bytes: u64) -> std::io::Result<String> {
  let metadata = std::fs::metadata(path)?;
  if metadata.len() > max_bytes {
    return Ok(String::new());
  }

  let bytes = std::fs::read(path)?;
  if bytes.contains(&0) {
    return Ok(String::new());
  }

  Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait::async_trait]
impl Extractor for TextExtractor {
  async fn extract(&self, path: &Path, timeout: Duration) -> String {
    let owned = path.to_path_buf();
    let max_bytes = self.max_bytes;
    let read = tokio::task::spawn_blocking(move || read_text(&owned, max_bytes));

    match tokio::time::timeout(timeout, read).await {
      Ok(Ok(Ok(text))) => {
        if text.is_empty() {
          debug!(path = %path.display(), "No text extracted");
        }
        text
      }
      Ok(Ok(Err(e))) => {
        warn!(path = %path.display(), error = %e, "Extraction failed");
        String::new()
      }
      Ok(Err(e)) => {
        warn!(path = %path.display(), error = %e, "Extraction task failed");
        String::new()
      }
      Err(_) => {
        warn!(path = %path.display(), timeout_ms = timeout.as_millis() as u64, "Extraction timed out");
        String::new()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const TIMEOUT: Duration = Duration::from_secs(5);

  #[tokio::test]
  async fn test_extracts_utf8_text() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# Title\nbody").unwrap();

    let text = TextExtractor::default().extract(&path, TIMEOUT).await;
    assert_eq!(text, "# Title\nbody");
  }

  #[tokio::test]
  async fn test_binary_yields_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blob.bin");
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0, 1]).unwrap();

    assert!(TextExtractor::default().extract(&path, TIMEOUT).await.is_empty());
  }

  #[tokio::test]
  async fn test_oversized_yields_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.txt");
    std::fs::write(&path, "x".repeat(64)).unwrap();

    assert!(TextExtractor::new(16).extract(&path, TIMEOUT).await.is_empty());
  }

  #[tokio::test]
  async fn test_missing_file_yields_empty() {
    let dir = TempDir::new().unwrap();
    let text = TextExtractor::default().extract(&dir.path().join("gone.txt"), TIMEOUT).await;
    assert!(text.is_empty());
  }
}
