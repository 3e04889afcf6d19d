//! Turns file-system paths into index mutations.
//!
//! Shared by the live worker and the network poller so both produce identical
//! documents for the same file.

use std::{path::Path, sync::Arc};

use syncdex_core::{ExtractConfig, normalize_path};
use tracing::{debug, trace};

use crate::{
  document::Document,
  extract::Extractor,
  gateway::{GatewayError, IndexGateway},
};

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
  #[error("Failed to stat {path}: {source}")]
  Stat {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("Index error: {0}")]
  Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  Upserted,
  /// Not a regular file any more, or nothing to index
  Skipped,
}

#[derive(Clone)]
pub struct Mutator {
  gateway: Arc<dyn IndexGateway>,
  extractor: Arc<dyn Extractor>,
  config: ExtractConfig,
}

impl Mutator {
  pub fn new(gateway: Arc<dyn IndexGateway>, extractor: Arc<dyn Extractor>, config: ExtractConfig) -> Self {
    Self {
      gateway,
      extractor,
      config,
    }
  }

  pub fn gateway(&self) -> &Arc<dyn IndexGateway> {
    &self.gateway
  }

  /// Extract `path` and insert or replace its document
  pub async fn upsert_path(&self, path: &Path) -> Result<UpsertOutcome, MutationError> {
    let metadata = match tokio::fs::metadata(path).await {
      Ok(m) => m,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        trace!(path = %path.display(), "File vanished before upsert");
        return Ok(UpsertOutcome::Skipped);
      }
      Err(source) => {
        return Err(MutationError::Stat {
          path: normalize_path(path),
          source,
        });
      }
    };
    if !metadata.is_file() {
      return Ok(UpsertOutcome::Skipped);
    }

    let content = if metadata.len() > self.config.max_file_size {
      debug!(path = %path.display(), size = metadata.len(), "Over size limit, indexing metadata only");
      String::new()
    } else {
      self.extractor.extract(path, self.config.timeout()).await
    };

    if content.is_empty() && metadata.len() > 0 && !self.config.metadata_only_on_failure {
      debug!(path = %path.display(), "No text extracted, skipping");
      return Ok(UpsertOutcome::Skipped);
    }

    let document = Document::from_metadata(path, &metadata, content);
    self.gateway.upsert(document).await?;
    trace!(path = %path.display(), "Upserted");
    Ok(UpsertOutcome::Upserted)
  }

  pub async fn delete_path(&self, path: &Path) -> Result<(), MutationError> {
    self.gateway.delete(&normalize_path(path)).await?;
    trace!(path = %path.display(), "Deleted");
    Ok(())
  }

  /// Delete every document below the directory `path`
  pub async fn delete_prefix(&self, path: &Path) -> Result<(), MutationError> {
    let prefix = normalize_path(path);
    // The directory may itself have been indexed as a file under the same name
    self.gateway.delete(&prefix).await?;
    self.gateway.delete_prefix(&prefix).await?;
    trace!(path = %path.display(), "Deleted subtree");
    Ok(())
  }

  pub async fn commit(&self) -> Result<(), MutationError> {
    self.gateway.commit().await?;
    Ok(())
  }
}
