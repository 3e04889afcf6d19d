//! Single consumer that applies local changes to the index
//!
//! Exactly one worker exists per live service, so local mutations reach the
//! gateway strictly one at a time. A failed job is logged and the worker moves
//! on to the next one.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::message::IndexJob;
use crate::{
  mutation::{MutationError, Mutator, UpsertOutcome},
  stability::{StabilityConfig, wait_stable},
};

pub struct IndexWorker {
  job_rx: mpsc::Receiver<IndexJob>,
  mutator: Mutator,
  stability: StabilityConfig,
  cancel: CancellationToken,
  dirty: bool,
}

impl IndexWorker {
  pub fn new(
    job_rx: mpsc::Receiver<IndexJob>,
    mutator: Mutator,
    stability: StabilityConfig,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      job_rx,
      mutator,
      stability,
      cancel,
      dirty: false,
    }
  }

  pub fn spawn(self) -> tokio::task::JoinHandle<()> {
    tokio::spawn(self.run())
  }

  /// Process jobs until cancelled or the queue closes.
  ///
  /// Commits whenever the queue runs empty. On cancellation queued jobs are
  /// discarded, but whatever was already applied is committed.
  pub async fn run(mut self) {
    info!("IndexWorker started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              let mut discarded = 0usize;
              while self.job_rx.try_recv().is_ok() {
                  discarded += 1;
              }
              info!(discarded, "IndexWorker shutting down (cancelled)");
              break;
          }

          job = self.job_rx.recv() => {
              match job {
                  Some(job) => {
                      if let Err(e) = self.handle_job(&job).await {
                          error!(path = %job.path().display(), error = %e, "Index job failed");
                      }
                      if self.job_rx.is_empty() {
                          self.commit().await;
                      }
                  }
                  None => {
                      info!("IndexWorker shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    self.commit().await;
    info!("IndexWorker stopped");
  }

  async fn handle_job(&mut self, job: &IndexJob) -> Result<(), MutationError> {
    match job {
      IndexJob::Delete { path, directory } => {
        // Deletes never wait on stability: the path is already gone
        if *directory {
          self.mutator.delete_prefix(path).await?;
        } else {
          self.mutator.delete_path(path).await?;
        }
        self.dirty = true;
      }
      IndexJob::Upsert { path } => {
        if !wait_stable(path, self.stability).await {
          debug!(path = %path.display(), "Path gone or not a file, skipping upsert");
          return Ok(());
        }
        if self.mutator.upsert_path(path).await? == UpsertOutcome::Upserted {
          self.dirty = true;
        }
      }
    }
    Ok(())
  }

  async fn commit(&mut self) {
    if !self.dirty {
      return;
    }
    match self.mutator.commit().await {
      Ok(()) => {
        self.dirty = false;
        debug!("Committed local changes");
      }
      Err(e) => error!(error = %e, "Commit failed"),
    }
  }
}
