//! Shared building blocks for syncdex: configuration, platform directories and
//! path normalization.

pub mod config;
pub mod dirs;
pub mod path;

pub use config::{Config, ConfigError, DaemonConfig, ExtractConfig, SourceConfig, SyncConfig};
pub use path::{RootKind, SourceRoot, normalize_path};
