//! The narrow contract the sync engine uses against the document store.
//!
//! Every operation must be idempotent: a poll cycle that crashes before its
//! snapshot is saved replays the same upserts and deletes on the next run.

mod journal;
mod memory;

pub use journal::JournalIndex;
pub use memory::MemoryIndex;

use crate::document::Document;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Serialization error: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("Index unavailable: {0}")]
  Unavailable(String),
}

#[async_trait::async_trait]
pub trait IndexGateway: Send + Sync {
  fn name(&self) -> &str;

  /// Insert or replace the document keyed by `document.path`
  async fn upsert(&self, document: Document) -> Result<(), GatewayError>;

  /// Remove the document keyed by `path`. Absent keys are not an error.
  async fn delete(&self, path: &str) -> Result<(), GatewayError>;

  /// Remove every document stored below the directory `prefix`
  async fn delete_prefix(&self, prefix: &str) -> Result<(), GatewayError>;

  /// Durability boundary: mutations before this call become visible to search
  async fn commit(&self) -> Result<(), GatewayError>;
}

/// `prefix` as a directory, so `/a/b` does not match `/a/bc/file`
pub(crate) fn directory_prefix(prefix: &str) -> String {
  if prefix.ends_with('/') {
    prefix.to_string()
  } else {
    format!("{prefix}/")
  }
}
