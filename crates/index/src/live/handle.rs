use tokio::sync::mpsc;

use super::message::IndexJob;

/// Handle to the index worker's bounded queue
///
/// Cheap to clone. `send` waits while the queue is full, which pushes back on
/// the debouncer during event storms.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
  pub tx: mpsc::Sender<IndexJob>,
}

impl WorkerHandle {
  pub fn new(tx: mpsc::Sender<IndexJob>) -> Self {
    Self { tx }
  }

  pub async fn send(&self, job: IndexJob) -> Result<(), SendError> {
    self.tx.send(job).await.map_err(|_| SendError::ActorGone)
  }

  /// Jobs the queue can still take without waiting
  pub fn capacity(&self) -> usize {
    self.tx.capacity()
  }
}

/// Error when sending to the worker
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Index worker has shut down")]
  ActorGone,
}
