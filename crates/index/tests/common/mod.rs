//! Shared helpers for index integration tests.
//!
//! `SyncTestContext` owns a scratch root and data directory plus an in-memory
//! gateway, and builds pipeline components with short timings.

#![allow(dead_code)]

use std::{
  path::PathBuf,
  sync::Arc,
  time::Duration,
};

use filetime::FileTime;
use index::{
  Extractor, FilterSet, LiveIndexService, LiveSettings, MemoryIndex, Mutator, NetworkPoller, SnapshotStore,
  StabilityConfig, TextExtractor,
};
use syncdex_core::{ExtractConfig, normalize_path};
use tempfile::TempDir;

pub struct SyncTestContext {
  /// Source root (canonicalized)
  pub root: PathBuf,
  _root_dir: TempDir,
  pub data_dir: TempDir,
  pub index: Arc<MemoryIndex>,
}

impl SyncTestContext {
  pub fn new() -> Self {
    let root_dir = TempDir::new().expect("create root temp dir");
    let data_dir = TempDir::new().expect("create data temp dir");
    let root = root_dir.path().canonicalize().expect("canonicalize root");

    Self {
      root,
      _root_dir: root_dir,
      data_dir,
      index: Arc::new(MemoryIndex::new()),
    }
  }

  pub fn mutator(&self) -> Mutator {
    self.mutator_with(Arc::new(TextExtractor::default()))
  }

  pub fn mutator_with(&self, extractor: Arc<dyn Extractor>) -> Mutator {
    Mutator::new(self.index.clone(), extractor, ExtractConfig::default())
  }

  pub fn filters(&self) -> FilterSet {
    FilterSet::build(std::slice::from_ref(&self.root), &[], &[])
  }

  /// Short timings so tests settle quickly
  pub fn live_settings() -> LiveSettings {
    LiveSettings {
      debounce: Duration::from_millis(100),
      stability: StabilityConfig {
        max_wait: Duration::from_millis(300),
        poll_interval: Duration::from_millis(30),
      },
      queue_capacity: 64,
    }
  }

  pub fn start_live(&self) -> LiveIndexService {
    LiveIndexService::start(
      vec![self.root.clone()],
      self.filters(),
      Self::live_settings(),
      self.mutator(),
    )
    .expect("start live service")
  }

  pub fn store(&self) -> SnapshotStore {
    SnapshotStore::open(&self.data_dir.path().join("snapshots")).expect("open snapshot store")
  }

  pub fn poller(&self) -> NetworkPoller {
    NetworkPoller::new(vec![self.root.clone()], self.filters(), self.store(), self.mutator())
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root.join(relative)
  }

  pub fn key(&self, relative: &str) -> String {
    normalize_path(&self.path(relative))
  }

  /// Write a file, creating parent directories
  pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, content).expect("write file");
    path
  }

  /// Write a file with a fixed mtime (seconds since the epoch)
  pub fn write_file_at(&self, relative: &str, content: &str, mtime_secs: i64) -> PathBuf {
    let path = self.write_file(relative, content);
    filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).expect("set mtime");
    path
  }

  pub fn remove_file(&self, relative: &str) {
    std::fs::remove_file(self.path(relative)).expect("remove file");
  }
}

/// Poll `condition` every 20ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  condition()
}

/// Give the watcher time to settle after startup
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(100)).await;
}
