//! Config commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use syncdex_core::Config;

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
  match explicit {
    Some(path) => Ok(path.to_path_buf()),
    None => Config::user_config_path().context("Could not determine user config path"),
  }
}

/// Write the config template
pub fn cmd_config_init(explicit: Option<&Path>, force: bool) -> Result<()> {
  let path = target_path(explicit)?;

  if path.exists() && !force {
    bail!("Config file already exists: {} (use --force to overwrite)", path.display());
  }

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }
  std::fs::write(&path, Config::generate_template()).with_context(|| format!("Failed to write {}", path.display()))?;

  println!("Created config: {}", path.display());
  println!("Add [[sources]] entries, then run `syncdex run`");
  Ok(())
}

/// Print where the config came from and its effective values
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  match explicit {
    Some(path) => println!("Using config: {}", path.display()),
    None => match Config::user_config_path() {
      Some(path) if path.exists() => println!("Using user config: {}", path.display()),
      _ => println!("Using default configuration (no config file found)"),
    },
  }
  println!("Data directory: {}", config.data_dir().display());
  println!();

  let toml_str = toml::to_string_pretty(config)?;
  println!("{}", toml_str);
  Ok(())
}
