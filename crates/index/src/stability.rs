//! Wait for a file to stop growing before it is read.
//!
//! Copy tools and editors write in several steps; extracting a half-written
//! file wastes work and indexes truncated text.

use std::{path::Path, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
  /// Give up waiting after this long and treat the file as stable
  pub max_wait: Duration,
  /// Delay between size samples
  pub poll_interval: Duration,
}

impl Default for StabilityConfig {
  fn default() -> Self {
    Self {
      max_wait: Duration::from_millis(2000),
      poll_interval: Duration::from_millis(300),
    }
  }
}

/// Current size of a regular file, `None` if it is gone or a directory
async fn sample_size(path: &Path) -> Option<u64> {
  match tokio::fs::metadata(path).await {
    Ok(m) if m.is_dir() => None,
    Ok(m) => Some(m.len()),
    Err(_) => None,
  }
}

/// Returns `true` once two consecutive size samples agree, or when
/// `max_wait` elapses first. Returns `false` only when the path no longer
/// exists or is a directory; callers treat that as a no-op, not a delete.
pub async fn wait_stable(path: &Path, config: StabilityConfig) -> bool {
  let deadline = Instant::now() + config.max_wait;

  let Some(mut last) = sample_size(path).await else {
    trace!(path = %path.display(), "Not a regular file, skipping");
    return false;
  };

  loop {
    sleep(config.poll_interval).await;

    let Some(size) = sample_size(path).await else {
      trace!(path = %path.display(), "File vanished while waiting");
      return false;
    };

    if size == last {
      return true;
    }

    if Instant::now() >= deadline {
      trace!(path = %path.display(), size, "Still growing at deadline, proceeding");
      return true;
    }

    trace!(path = %path.display(), from = last, to = size, "File still growing");
    last = size;
  }
}
