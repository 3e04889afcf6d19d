//! syncdex CLI - keep a full-text index in step with local and network folders

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use syncdex_core::Config;

mod commands;
mod logging;

use commands::{cmd_config_init, cmd_config_show, cmd_poll, cmd_run, cmd_snapshot};
use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "syncdex")]
#[command(about = "Keep a full-text index in sync with local and network folders")]
#[command(after_help = "\
QUICK START:
  syncdex config init             # Write a config template
  syncdex run --foreground        # Watch local sources, poll network sources
  syncdex poll                    # Poll network sources once")]
struct Cli {
  /// Config file (default: user config dir)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `syncdex config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Write the default config template to the user config path
  Init {
    /// Overwrite an existing config
    #[arg(long)]
    force: bool,
  },
  /// Print the effective configuration
  Show,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the sync daemon until interrupted
  Run {
    /// Log to the console instead of the log file
    #[arg(long)]
    foreground: bool,
    /// Apply mutations to an in-memory index instead of the journal
    #[arg(long)]
    dry_run: bool,
  },
  /// Poll every network source once and print the stats
  Poll {
    /// Apply mutations to an in-memory index instead of the journal
    #[arg(long)]
    dry_run: bool,
  },
  /// Summarize the stored snapshot of a root
  Snapshot {
    /// Root directory
    root: PathBuf,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // `config init` must work even when the existing file is broken
  if let Commands::Config {
    command: ConfigCommand::Init { force },
  } = &cli.command
  {
    return cmd_config_init(cli.config.as_deref(), *force);
  }

  let mut config = Config::read(cli.config.as_deref()).context("Failed to load configuration")?;

  let _guard = match &cli.command {
    Commands::Run { foreground, .. } => init_daemon_logging(&config, *foreground),
    _ => {
      init_cli_logging(&config);
      None
    }
  };

  // Validate after logging is installed so clamp warnings are not lost
  config.validate().context("Invalid configuration")?;

  match cli.command {
    Commands::Run { dry_run, .. } => cmd_run(&config, dry_run).await,
    Commands::Poll { dry_run } => cmd_poll(&config, dry_run).await,
    Commands::Snapshot { root } => cmd_snapshot(&config, &root).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()),
      ConfigCommand::Init { .. } => Ok(()),
    },
  }
}
