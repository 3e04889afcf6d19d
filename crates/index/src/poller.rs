//! Network poller - snapshot diffing for roots without reliable notifications
//!
//! One cycle per root:
//! 1. Load the last snapshot (empty if none)
//! 2. Walk the tree, recording `(size, mtime)` for every accepted file
//! 3. Diff old against new
//! 4. Upsert created/modified paths, delete removed ones; failures are logged
//! 5. Commit, then replace the stored snapshot
//!
//! A crash between 4 and 5 leaves the old snapshot in place, so the next cycle
//! recomputes and re-applies the same changes. Gateway operations are
//! idempotent, which makes the replay harmless.
//!
//! At most one cycle per root is in flight: scheduled and on-demand polls take
//! the same per-root lock.

use std::{
  collections::HashMap,
  fmt,
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant},
};

use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
  filter::FilterSet,
  mutation::Mutator,
  snapshot::{Snapshot, SnapshotDiff, SnapshotEntry, SnapshotError, SnapshotStore},
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PollError {
  #[error("Root unavailable: {0}")]
  RootUnavailable(PathBuf),
  #[error("Snapshot error: {0}")]
  Snapshot(#[from] SnapshotError),
  #[error("Walk task failed: {0}")]
  Walk(#[from] tokio::task::JoinError),
}

/// Counters for one poll call, summed across roots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
  pub scanned: usize,
  pub created: usize,
  pub modified: usize,
  pub deleted: usize,
  pub elapsed: Duration,
}

impl PollStats {
  pub fn merge(&mut self, other: &PollStats) {
    self.scanned += other.scanned;
    self.created += other.created;
    self.modified += other.modified;
    self.deleted += other.deleted;
    self.elapsed += other.elapsed;
  }

  pub fn changes(&self) -> usize {
    self.created + self.modified + self.deleted
  }
}

impl fmt::Display for PollStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "scanned={} created={} modified={} deleted={} elapsed={}ms",
      self.scanned,
      self.created,
      self.modified,
      self.deleted,
      self.elapsed.as_millis()
    )
  }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
  pub interval: Duration,
  pub initial_delay: Duration,
}

impl Default for PollerConfig {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(15 * 60),
      initial_delay: Duration::from_secs(3),
    }
  }
}

impl PollerConfig {
  pub fn from_config(sync: &syncdex_core::SyncConfig) -> Self {
    Self {
      interval: sync.poll_interval(),
      initial_delay: sync.initial_poll_delay(),
    }
  }
}

// ============================================================================
// Poller
// ============================================================================

struct Inner {
  roots: Vec<PathBuf>,
  filters: FilterSet,
  store: SnapshotStore,
  mutator: Mutator,
  root_locks: HashMap<PathBuf, Arc<Mutex<()>>>,
  last_stats: Mutex<Option<PollStats>>,
}

/// Polls network roots on a schedule or on demand. Cheap to clone.
#[derive(Clone)]
pub struct NetworkPoller {
  inner: Arc<Inner>,
  cancel: CancellationToken,
}

impl NetworkPoller {
  pub fn new(roots: Vec<PathBuf>, filters: FilterSet, store: SnapshotStore, mutator: Mutator) -> Self {
    let root_locks = roots.iter().map(|r| (r.clone(), Arc::new(Mutex::new(())))).collect();
    Self {
      inner: Arc::new(Inner {
        roots,
        filters,
        store,
        mutator,
        root_locks,
        last_stats: Mutex::new(None),
      }),
      cancel: CancellationToken::new(),
    }
  }

  pub fn roots(&self) -> &[PathBuf] {
    &self.inner.roots
  }

  /// Stats of the most recent completed poll, scheduled or on demand
  pub async fn last_stats(&self) -> Option<PollStats> {
    *self.inner.last_stats.lock().await
  }

  /// Schedule recurring polls: the first after `initial_delay`, then every
  /// `interval`. Stopping never interrupts a cycle that already started.
  pub fn start(&self, config: PollerConfig) -> JoinHandle<()> {
    let poller = self.clone();
    let cancel = self.cancel.clone();
    let interval = config.interval.max(Duration::from_secs(1));

    tokio::spawn(async move {
      info!(
        roots = poller.inner.roots.len(),
        interval_secs = interval.as_secs(),
        "NetworkPoller started"
      );

      let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + config.initial_delay, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("NetworkPoller shutting down (cancelled)");
                break;
            }

            _ = ticker.tick() => {
                let stats = poller.poll_now().await;
                info!(%stats, "Scheduled poll complete");
            }
        }
      }

      info!("NetworkPoller stopped");
    })
  }

  /// Cancel the schedule
  pub fn stop(&self) {
    self.cancel.cancel();
  }

  /// Cancel the schedule and wait for the scheduler task to exit
  pub async fn close(&self, schedule: JoinHandle<()>) {
    self.stop();
    if let Err(e) = schedule.await {
      warn!(error = %e, "Poll scheduler ended abnormally");
    }
  }

  /// Poll every root once, now
  pub async fn poll_now(&self) -> PollStats {
    let mut total = PollStats::default();

    for root in &self.inner.roots {
      match self.poll_root(root).await {
        Ok(stats) => {
          debug!(root = %root.display(), %stats, "Polled root");
          total.merge(&stats);
        }
        Err(e) => warn!(root = %root.display(), error = %e, "Poll of root failed"),
      }
    }

    *self.inner.last_stats.lock().await = Some(total);
    total
  }

  /// Run [`poll_now`](Self::poll_now) on a separate task
  pub fn poll_now_spawned(&self) -> JoinHandle<PollStats> {
    let poller = self.clone();
    tokio::spawn(async move { poller.poll_now().await })
  }

  /// One full cycle for one root
  pub async fn poll_root(&self, root: &Path) -> Result<PollStats, PollError> {
    let started = Instant::now();

    let lock = self
      .inner
      .root_locks
      .get(root)
      .cloned()
      .unwrap_or_else(|| Arc::new(Mutex::new(())));
    let _guard = lock.lock().await;

    let old = self.inner.store.load(root).await?;

    // An unmounted share must not read as "every file was deleted"
    match tokio::fs::metadata(root).await {
      Ok(m) if m.is_dir() => {}
      _ => return Err(PollError::RootUnavailable(root.to_path_buf())),
    }

    let new = {
      let root = root.to_path_buf();
      let filters = self.inner.filters.clone();
      tokio::task::spawn_blocking(move || walk_root(&root, &filters)).await?
    };

    let diff = SnapshotDiff::compute(&old, &new);
    debug!(
      root = %root.display(),
      created = diff.created.len(),
      modified = diff.modified.len(),
      deleted = diff.deleted.len(),
      "Computed snapshot diff"
    );

    self.apply(&diff).await;

    if !diff.is_empty()
      && let Err(e) = self.inner.mutator.commit().await
    {
      warn!(root = %root.display(), error = %e, "Commit failed");
    }

    if let Err(e) = self.inner.store.save(root, &new).await {
      warn!(root = %root.display(), error = %e, "Failed to save snapshot, next poll will replay");
    }

    Ok(PollStats {
      scanned: new.len(),
      created: diff.created.len(),
      modified: diff.modified.len(),
      deleted: diff.deleted.len(),
      elapsed: started.elapsed(),
    })
  }

  async fn apply(&self, diff: &SnapshotDiff) {
    let mutator = &self.inner.mutator;

    for path in diff.created.iter().chain(&diff.modified) {
      if let Err(e) = mutator.upsert_path(path).await {
        warn!(path = %path.display(), error = %e, "Upsert failed");
      }
    }

    for path in &diff.deleted {
      if let Err(e) = mutator.delete_path(path).await {
        warn!(path = %path.display(), error = %e, "Delete failed");
      }
    }
  }
}

/// Current listing of `root`. Unreadable entries are skipped.
fn walk_root(root: &Path, filters: &FilterSet) -> Snapshot {
  let mut snapshot = Snapshot::new();

  let walker = walkdir::WalkDir::new(root)
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !filters.is_excluded(e.path(), true));

  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        debug!(error = %e, "Skipping unreadable entry");
        continue;
      }
    };
    if !entry.file_type().is_file() || !filters.accepts_file(entry.path()) {
      continue;
    }
    match entry.metadata() {
      Ok(metadata) => {
        snapshot.insert(entry.into_path(), SnapshotEntry::from_metadata(&metadata));
      }
      Err(e) => trace!(path = %entry.path().display(), error = %e, "Skipping file without metadata"),
    }
  }

  snapshot
}
