use std::{fs::Metadata, path::Path};

use serde::{Deserialize, Serialize};
use syncdex_core::normalize_path;

use crate::snapshot::mtime_millis;

/// The upsert payload handed to the index, keyed by `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  /// Normalized absolute path (document key)
  pub path: String,
  pub file_name: String,
  /// Lowercased extension without the dot
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extension: Option<String>,
  pub size: u64,
  pub mtime_millis: i64,
  /// Extracted text; empty when extraction produced nothing
  pub content: String,
}

impl Document {
  pub fn from_metadata(path: &Path, metadata: &Metadata, content: String) -> Self {
    Self {
      path: normalize_path(path),
      file_name: path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default(),
      extension: path.extension().map(|e| e.to_string_lossy().to_lowercase()),
      size: metadata.len(),
      mtime_millis: mtime_millis(metadata),
      content,
    }
  }

  pub fn has_content(&self) -> bool {
    !self.content.is_empty()
  }
}
