//! Jobs sent to the index worker

use std::path::PathBuf;

/// A coalesced change ready to be applied to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexJob {
  /// Wait for the file to settle, extract it and upsert
  Upsert { path: PathBuf },
  /// Remove the document, or the whole subtree when `directory` is set
  Delete { path: PathBuf, directory: bool },
}

impl IndexJob {
  pub fn path(&self) -> &PathBuf {
    match self {
      IndexJob::Upsert { path } | IndexJob::Delete { path, .. } => path,
    }
  }
}
