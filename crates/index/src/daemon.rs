//! SyncDaemon - wires both sync paths together from a [`Config`]
//!
//! ```text
//! Config.sources ─┬─ local ───▶ LiveIndexService ──┐
//!                 └─ network ─▶ NetworkPoller ─────┴─▶ IndexGateway
//! ```

use std::{path::PathBuf, sync::Arc};

use syncdex_core::{Config, SourceConfig, SourceRoot, dirs::snapshot_dir};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
  extract::Extractor,
  filter::FilterSet,
  gateway::IndexGateway,
  live::{LiveIndexService, LiveSettings},
  mutation::Mutator,
  poller::{NetworkPoller, PollerConfig},
  snapshot::{SnapshotError, SnapshotStore},
  watcher::WatcherError,
};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error("Failed to start live indexing: {0}")]
  Watcher(#[from] WatcherError),
  #[error("Failed to open snapshot store: {0}")]
  Snapshot(#[from] SnapshotError),
}

/// Resolve sources of one kind, skipping (and logging) missing roots
pub fn resolve_sources<'a>(sources: impl Iterator<Item = &'a SourceConfig>) -> Vec<SourceRoot> {
  sources
    .filter_map(|source| match source.resolve() {
      Ok(root) => Some(root),
      Err(e) => {
        warn!(path = %source.path.display(), error = %e, "Source root unavailable, skipping");
        None
      }
    })
    .collect()
}

/// Filters for `roots`, with the data directory never indexed
pub fn build_filters(config: &Config, roots: &[PathBuf]) -> FilterSet {
  let mut filters = FilterSet::build(roots, &config.exclude, &config.extract.extensions);
  let data_dir = config.data_dir();
  filters.exclude_subtree(data_dir.canonicalize().unwrap_or(data_dir));
  filters
}

/// Open the snapshot store under the configured data directory
pub fn open_snapshot_store(config: &Config) -> Result<SnapshotStore, SnapshotError> {
  SnapshotStore::open(&snapshot_dir(&config.data_dir()))
}

/// Running live service and poller
pub struct SyncDaemon {
  live: Option<LiveIndexService>,
  poller: Option<(NetworkPoller, JoinHandle<()>)>,
}

impl SyncDaemon {
  /// Start live indexing for local sources and scheduled polling for network
  /// sources. Either side is skipped when it has no roots.
  pub fn start(
    config: &Config,
    gateway: Arc<dyn IndexGateway>,
    extractor: Arc<dyn Extractor>,
  ) -> Result<Self, DaemonError> {
    let mutator = Mutator::new(gateway.clone(), extractor, config.extract.clone());

    let local: Vec<PathBuf> = resolve_sources(config.local_sources())
      .into_iter()
      .map(|r| r.path)
      .collect();
    let network: Vec<PathBuf> = resolve_sources(config.network_sources())
      .into_iter()
      .map(|r| r.path)
      .collect();

    // Open the store before anything is running so a failure leaves no tasks behind
    let store = if network.is_empty() {
      None
    } else {
      Some(open_snapshot_store(config)?)
    };

    let live = if local.is_empty() {
      None
    } else {
      let filters = build_filters(config, &local);
      Some(LiveIndexService::start(
        local.clone(),
        filters,
        LiveSettings::from_config(&config.sync),
        mutator.clone(),
      )?)
    };

    let poller = match store {
      Some(store) => {
        let filters = build_filters(config, &network);
        let poller = NetworkPoller::new(network.clone(), filters, store, mutator);
        let schedule = poller.start(PollerConfig::from_config(&config.sync));
        Some((poller, schedule))
      }
      None => None,
    };

    info!(
      gateway = gateway.name(),
      local = local.len(),
      network = network.len(),
      "Sync daemon started"
    );

    Ok(Self { live, poller })
  }

  pub fn poller(&self) -> Option<&NetworkPoller> {
    self.poller.as_ref().map(|(p, _)| p)
  }

  pub fn live(&self) -> Option<&LiveIndexService> {
    self.live.as_ref()
  }

  /// Stop both sync paths. An in-flight poll cycle completes first.
  pub async fn shutdown(self) {
    info!("Sync daemon shutting down");

    if let Some(live) = self.live {
      live.close().await;
    }
    if let Some((poller, schedule)) = self.poller {
      poller.close(schedule).await;
    }

    info!("Sync daemon stopped");
  }
}
