//! Snapshot inspection

use std::path::Path;

use anyhow::{Context, Result};
use index::daemon::open_snapshot_store;
use syncdex_core::Config;

/// Print the size of the stored snapshot for `root`
pub async fn cmd_snapshot(config: &Config, root: &Path) -> Result<()> {
  let store = open_snapshot_store(config).context("Failed to open snapshot store")?;
  let snapshot = store
    .load(root)
    .await
    .with_context(|| format!("Failed to load snapshot for {}", root.display()))?;

  let total_bytes: u64 = snapshot.values().map(|e| e.size).sum();

  println!("Root:    {}", root.display());
  println!("Record:  {}", store.record_path(root).display());
  println!("Entries: {}", snapshot.len());
  println!("Bytes:   {}", total_bytes);
  Ok(())
}
