use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{GatewayError, IndexGateway, directory_prefix};
use crate::document::Document;

/// Mutation counters for a [`MemoryIndex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryIndexStats {
  pub upserts: u64,
  pub deletes: u64,
  pub commits: u64,
}

/// In-process document store
///
/// Safe for the two concurrent writer streams (live worker and poller); every
/// operation touches a single shard of the map.
#[derive(Debug, Default)]
pub struct MemoryIndex {
  docs: DashMap<String, Document>,
  upserts: AtomicU64,
  deletes: AtomicU64,
  commits: AtomicU64,
}

impl MemoryIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, path: &str) -> Option<Document> {
    self.docs.get(path).map(|d| d.clone())
  }

  pub fn contains(&self, path: &str) -> bool {
    self.docs.contains_key(path)
  }

  pub fn len(&self) -> usize {
    self.docs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.docs.is_empty()
  }

  /// All stored keys, sorted
  pub fn paths(&self) -> Vec<String> {
    let mut paths: Vec<String> = self.docs.iter().map(|e| e.key().clone()).collect();
    paths.sort();
    paths
  }

  pub fn stats(&self) -> MemoryIndexStats {
    MemoryIndexStats {
      upserts: self.upserts.load(Ordering::Relaxed),
      deletes: self.deletes.load(Ordering::Relaxed),
      commits: self.commits.load(Ordering::Relaxed),
    }
  }
}

#[async_trait::async_trait]
impl IndexGateway for MemoryIndex {
  fn name(&self) -> &str {
    "memory"
  }

  async fn upsert(&self, document: Document) -> Result<(), GatewayError> {
    self.upserts.fetch_add(1, Ordering::Relaxed);
    self.docs.insert(document.path.clone(), document);
    Ok(())
  }

  async fn delete(&self, path: &str) -> Result<(), GatewayError> {
    self.deletes.fetch_add(1, Ordering::Relaxed);
    self.docs.remove(path);
    Ok(())
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), GatewayError> {
    let prefix = directory_prefix(prefix);
    self.deletes.fetch_add(1, Ordering::Relaxed);
    self.docs.retain(|key, _| !key.starts_with(&prefix));
    Ok(())
  }

  async fn commit(&self) -> Result<(), GatewayError> {
    self.commits.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(path: &str, content: &str) -> Document {
    Document {
      path: path.to_string(),
      file_name: path.rsplit('/').next().unwrap_or_default().to_string(),
      extension: None,
      size: content.len() as u64,
      mtime_millis: 1000,
      content: content.to_string(),
    }
  }

  #[tokio::test]
  async fn test_upsert_replaces_by_path() {
    let index = MemoryIndex::new();
    index.upsert(doc("/r/a.txt", "one")).await.unwrap();
    index.upsert(doc("/r/a.txt", "two")).await.unwrap();

    assert_eq!(index.len(), 1);
    assert_eq!(index.get("/r/a.txt").unwrap().content, "two");
    assert_eq!(index.stats().upserts, 2);
  }

  #[tokio::test]
  async fn test_delete_absent_is_noop() {
    let index = MemoryIndex::new();
    index.delete("/r/missing.txt").await.unwrap();
    assert!(index.is_empty());
  }

  #[tokio::test]
  async fn test_delete_prefix_respects_directory_boundary() {
    let index = MemoryIndex::new();
    index.upsert(doc("/r/sub/a.txt", "a")).await.unwrap();
    index.upsert(doc("/r/sub/deep/b.txt", "b")).await.unwrap();
    index.upsert(doc("/r/subway.txt", "c")).await.unwrap();

    index.delete_prefix("/r/sub").await.unwrap();

    assert_eq!(index.paths(), vec!["/r/subway.txt".to_string()]);
  }
}
