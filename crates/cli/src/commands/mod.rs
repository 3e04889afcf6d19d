//! CLI command implementations

mod config;
mod poll;
mod run;
mod snapshot;

use std::sync::Arc;

use anyhow::{Context, Result};
use index::{IndexGateway, JournalIndex, MemoryIndex};
use syncdex_core::Config;

pub use config::{cmd_config_init, cmd_config_show};
pub use poll::cmd_poll;
pub use run::cmd_run;
pub use snapshot::cmd_snapshot;

const JOURNAL_FILE_NAME: &str = "journal.jsonl";

/// The gateway a command writes to, plus the memory index when dry-running
struct Target {
  gateway: Arc<dyn IndexGateway>,
  memory: Option<Arc<MemoryIndex>>,
}

async fn open_target(config: &Config, dry_run: bool) -> Result<Target> {
  if dry_run {
    let memory = Arc::new(MemoryIndex::new());
    return Ok(Target {
      gateway: memory.clone(),
      memory: Some(memory),
    });
  }

  let path = config.data_dir().join(JOURNAL_FILE_NAME);
  let journal = JournalIndex::open(&path)
    .await
    .with_context(|| format!("Failed to open journal {}", path.display()))?;
  Ok(Target {
    gateway: Arc::new(journal),
    memory: None,
  })
}

impl Target {
  fn report(&self) {
    if let Some(memory) = &self.memory {
      let stats = memory.stats();
      println!(
        "Dry run: {} documents, {} upserts, {} deletes, {} commits",
        memory.len(),
        stats.upserts,
        stats.deletes,
        stats.commits
      );
    }
  }
}
