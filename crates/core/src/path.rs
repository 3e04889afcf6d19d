//! Root classification and the canonical path form used as document key.

use std::path::{Path, PathBuf};

/// How changes under a root are detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
  /// Live change notifications are trusted
  Local,
  /// Notifications are unreliable; the root is re-scanned periodically
  Network,
}

/// A configured source root after canonicalization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRoot {
  pub path: PathBuf,
  pub kind: RootKind,
}

impl SourceRoot {
  /// Canonicalize `path` and tag it. Fails if the root does not exist.
  pub fn resolve(path: &Path, kind: RootKind) -> std::io::Result<Self> {
    let path = path.canonicalize()?;
    Ok(Self { path, kind })
  }

  pub fn is_network(&self) -> bool {
    self.kind == RootKind::Network
  }
}

/// Render a path as the string key used by the document store.
///
/// Separators are always `/` so the same file maps to the same key on every
/// platform. Non UTF-8 components are converted lossily.
pub fn normalize_path(path: &Path) -> String {
  let raw = path.to_string_lossy();
  if std::path::MAIN_SEPARATOR == '/' {
    raw.into_owned()
  } else {
    raw.replace(std::path::MAIN_SEPARATOR, "/")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_path_keeps_forward_slashes() {
    assert_eq!(normalize_path(Path::new("/data/docs/a.txt")), "/data/docs/a.txt");
  }

  #[test]
  fn test_resolve_missing_root_fails() {
    let result = SourceRoot::resolve(Path::new("/definitely/not/here/syncdex"), RootKind::Local);
    assert!(result.is_err());
  }

  #[test]
  fn test_resolve_canonicalizes() {
    let dir = tempfile::TempDir::new().unwrap();
    let nested = dir.path().join("a");
    std::fs::create_dir(&nested).unwrap();
    let root = SourceRoot::resolve(&nested.join("..").join("a"), RootKind::Network).unwrap();
    assert_eq!(root.path, nested.canonicalize().unwrap());
    assert!(root.is_network());
  }
}
