//! Live indexing for local roots
//!
//! ```text
//! RecursiveWatcher ──FileChange──▶ Debouncer ──IndexJob──▶ IndexWorker ──▶ IndexGateway
//! ```
//!
//! All three stages are tasks joined by bounded channels and share one
//! cancellation token.

mod handle;
mod message;
mod worker;

use std::{path::PathBuf, time::Duration};

pub use handle::{SendError, WorkerHandle};
pub use message::IndexJob;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
pub use worker::IndexWorker;

use crate::{
  debounce::Debouncer,
  filter::FilterSet,
  mutation::Mutator,
  stability::StabilityConfig,
  watcher::{RecursiveWatcher, WatcherError},
};

#[derive(Debug, Clone)]
pub struct LiveSettings {
  pub debounce: Duration,
  pub stability: StabilityConfig,
  /// Bound on every channel between stages
  pub queue_capacity: usize,
}

impl Default for LiveSettings {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(500),
      stability: StabilityConfig::default(),
      queue_capacity: 256,
    }
  }
}

impl LiveSettings {
  pub fn from_config(sync: &syncdex_core::SyncConfig) -> Self {
    Self {
      debounce: sync.debounce(),
      stability: StabilityConfig {
        max_wait: sync.stability_max_wait(),
        poll_interval: sync.stability_poll_interval(),
      },
      queue_capacity: sync.worker_queue_capacity.max(1),
    }
  }
}

/// Watcher, debouncer and worker for a set of local roots
pub struct LiveIndexService {
  roots: Vec<PathBuf>,
  cancel: CancellationToken,
  tasks: Vec<JoinHandle<()>>,
}

impl LiveIndexService {
  /// Register every directory under `roots` and start the pipeline.
  ///
  /// Fails if notifications cannot be opened or a root cannot be watched.
  pub fn start(
    roots: Vec<PathBuf>,
    filters: FilterSet,
    settings: LiveSettings,
    mutator: Mutator,
  ) -> Result<Self, WatcherError> {
    let cancel = CancellationToken::new();
    let capacity = settings.queue_capacity.max(1);

    let (change_tx, change_rx) = mpsc::channel(capacity);
    let (job_tx, job_rx) = mpsc::channel(capacity);

    // Build the watcher first so a fatal error leaves nothing running
    let watcher = RecursiveWatcher::new(roots.clone(), filters, change_tx, cancel.child_token())?;

    let worker = IndexWorker::new(job_rx, mutator, settings.stability, cancel.child_token());
    let debouncer = Debouncer::new(settings.debounce, change_rx, WorkerHandle::new(job_tx), cancel.child_token());

    let tasks = vec![worker.spawn(), debouncer.spawn(), watcher.spawn()];

    info!(roots = roots.len(), "Live index service started");
    Ok(Self { roots, cancel, tasks })
  }

  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  pub fn is_running(&self) -> bool {
    !self.cancel.is_cancelled()
  }

  /// Stop accepting events, discard queued work and release subscriptions
  pub async fn close(mut self) {
    self.cancel.cancel();
    for task in self.tasks.drain(..) {
      if let Err(e) = task.await {
        warn!(error = %e, "Live index task ended abnormally");
      }
    }
    info!("Live index service stopped");
  }
}

impl Drop for LiveIndexService {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}
