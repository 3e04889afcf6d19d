//! Run command

use std::sync::Arc;

use anyhow::{Context, Result};
use index::{SyncDaemon, TextExtractor};
use syncdex_core::Config;
use tracing::info;

use super::open_target;

/// Start both sync paths and block until ctrl-c
pub async fn cmd_run(config: &Config, dry_run: bool) -> Result<()> {
  if config.sources.is_empty() {
    println!("No sources configured. Add [[sources]] entries to the config file.");
    return Ok(());
  }

  let target = open_target(config, dry_run).await?;
  let extractor = Arc::new(TextExtractor::new(config.extract.max_file_size));

  info!(sources = config.sources.len(), dry_run, "Starting syncdex daemon");
  let daemon = SyncDaemon::start(config, target.gateway.clone(), extractor).context("Failed to start daemon")?;

  tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
  info!("Interrupt received");

  daemon.shutdown().await;
  target.report();
  Ok(())
}
