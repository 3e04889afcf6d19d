// Debounce dispatcher - coalesces bursts of raw changes per path
//
// Every change to a path pushes that path's deadline `delay` into the future
// and replaces its pending kind, so the latest kind wins. When the deadline
// passes the coalesced change is delivered exactly once.
//
// Deadlines live in a min-heap. Re-scheduling a path does not search the heap:
// the old entry is left behind and discarded when popped because its sequence
// number no longer matches the pending change.

use std::{
  cmp::Reverse,
  collections::{BinaryHeap, HashMap},
  path::PathBuf,
  time::Duration,
};

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
  live::{IndexJob, WorkerHandle},
  watcher::{ChangeKind, FileChange},
};

#[derive(Debug, Clone)]
struct Pending {
  change: FileChange,
  seq: u64,
}

/// Pending changes keyed by path, ordered by deadline
#[derive(Debug)]
pub struct DebounceQueue {
  delay: Duration,
  pending: HashMap<PathBuf, Pending>,
  deadlines: BinaryHeap<Reverse<(Instant, u64, PathBuf)>>,
  next_seq: u64,
}

impl DebounceQueue {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: HashMap::new(),
      deadlines: BinaryHeap::new(),
      next_seq: 0,
    }
  }

  /// Record `change` observed at `now`, cancelling any earlier timer for its path
  pub fn push(&mut self, change: FileChange, now: Instant) {
    let seq = self.next_seq;
    self.next_seq += 1;

    let deadline = now + self.delay;
    let path = change.path.clone();
    let mut change = change;
    if let Some(previous) = self.pending.get(&path) {
      // A later plain delete of the same path must not forget the subtree
      if change.kind == ChangeKind::Delete && previous.change.directory {
        change.directory = true;
      }
      trace!(path = %path.display(), replaced = ?previous.change.kind, "Rescheduled pending change");
    }
    self.pending.insert(path.clone(), Pending { change, seq });
    self.deadlines.push(Reverse((deadline, seq, path)));
  }

  /// Earliest live deadline, discarding stale heap entries on the way
  pub fn next_deadline(&mut self) -> Option<Instant> {
    while let Some(Reverse((deadline, seq, path))) = self.deadlines.peek() {
      if self.pending.get(path).is_some_and(|p| p.seq == *seq) {
        return Some(*deadline);
      }
      self.deadlines.pop();
    }
    None
  }

  /// Remove and return every change whose deadline is at or before `now`
  pub fn pop_ready(&mut self, now: Instant) -> Vec<FileChange> {
    let mut ready = Vec::new();

    while let Some(Reverse((deadline, _, _))) = self.deadlines.peek() {
      if *deadline > now {
        break;
      }
      let Some(Reverse((_, seq, path))) = self.deadlines.pop() else {
        break;
      };
      if self.pending.get(&path).is_some_and(|p| p.seq == seq)
        && let Some(pending) = self.pending.remove(&path)
      {
        ready.push(pending.change);
      }
    }

    ready
  }

  /// Remove every pending change regardless of deadline
  pub fn drain(&mut self) -> Vec<FileChange> {
    self.deadlines.clear();
    self.pending.drain().map(|(_, p)| p.change).collect()
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}

impl From<FileChange> for IndexJob {
  fn from(change: FileChange) -> Self {
    match change.kind {
      ChangeKind::Delete => IndexJob::Delete {
        path: change.path,
        directory: change.directory,
      },
      ChangeKind::Create | ChangeKind::Modify => IndexJob::Upsert { path: change.path },
    }
  }
}

// ============================================================================
// Debouncer task
// ============================================================================

/// Task that sits between the watcher and the index worker
pub struct Debouncer {
  queue: DebounceQueue,
  input: mpsc::Receiver<FileChange>,
  worker: WorkerHandle,
  cancel: CancellationToken,
}

impl Debouncer {
  pub fn new(
    delay: Duration,
    input: mpsc::Receiver<FileChange>,
    worker: WorkerHandle,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      queue: DebounceQueue::new(delay),
      input,
      worker,
      cancel,
    }
  }

  pub fn spawn(self) -> tokio::task::JoinHandle<()> {
    tokio::spawn(self.run())
  }

  /// Run until cancelled (pending changes are discarded) or until the input
  /// closes (pending changes are flushed).
  pub async fn run(mut self) {
    info!(delay_ms = self.queue.delay.as_millis() as u64, "Debouncer started");

    loop {
      let deadline = self.queue.next_deadline();

      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              let dropped = self.queue.drain().len();
              info!(dropped, "Debouncer shutting down (cancelled)");
              return;
          }

          _ = async {
              match deadline {
                  Some(d) => tokio::time::sleep_until(d).await,
                  None => std::future::pending::<()>().await,
              }
          } => {
              for change in self.queue.pop_ready(Instant::now()) {
                  if !self.dispatch(change).await {
                      return;
                  }
              }
          }

          change = self.input.recv() => {
              match change {
                  Some(change) => self.queue.push(change, Instant::now()),
                  None => {
                      let remaining = self.queue.drain();
                      debug!(remaining = remaining.len(), "Input closed, flushing pending changes");
                      for change in remaining {
                          if !self.dispatch(change).await {
                              return;
                          }
                      }
                      info!("Debouncer stopped");
                      return;
                  }
              }
          }
      }
    }
  }

  async fn dispatch(&self, change: FileChange) -> bool {
    debug!(path = %change.path.display(), kind = ?change.kind, "Dispatching coalesced change");
    if self.worker.send(IndexJob::from(change)).await.is_err() {
      warn!("Index worker gone, stopping debouncer");
      return false;
    }
    true
  }
}
