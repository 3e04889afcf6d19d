//! One-shot poll of network sources

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use index::{
  Mutator, NetworkPoller, TextExtractor,
  daemon::{build_filters, open_snapshot_store, resolve_sources},
};
use syncdex_core::Config;

use super::open_target;

pub async fn cmd_poll(config: &Config, dry_run: bool) -> Result<()> {
  let roots: Vec<PathBuf> = resolve_sources(config.network_sources())
    .into_iter()
    .map(|r| r.path)
    .collect();
  if roots.is_empty() {
    println!("No network sources available to poll");
    return Ok(());
  }

  let target = open_target(config, dry_run).await?;
  let store = open_snapshot_store(config).context("Failed to open snapshot store")?;
  let mutator = Mutator::new(
    target.gateway.clone(),
    Arc::new(TextExtractor::new(config.extract.max_file_size)),
    config.extract.clone(),
  );

  let poller = NetworkPoller::new(roots.clone(), build_filters(config, &roots), store, mutator);
  let stats = poller.poll_now().await;

  println!("Polled {} root(s): {}", roots.len(), stats);
  target.report();
  Ok(())
}
