//! Exclusion and allowlist matching for paths under source roots.
//!
//! Each root gets its own compiled gitignore-style matcher made of:
//! - built-in patterns (VCS metadata, OS junk, partial downloads, editor swap files)
//! - the configured `exclude` globs
//! - an optional `.syncignore` file at the root

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

/// Per-root ignore file, gitignore syntax
pub const IGNORE_FILE_NAME: &str = ".syncignore";

/// Patterns excluded from every root regardless of configuration
const GLOBAL_PATTERNS: &[&str] = &[
  // Version control (directory and all contents)
  ".git/",
  ".hg/",
  ".svn/",
  // OS metadata
  ".DS_Store",
  "Thumbs.db",
  "desktop.ini",
  // Files still being written by editors, office suites and browsers
  "*.swp",
  "*.swx",
  "*~",
  "~$*",
  "*.tmp",
  "*.part",
  "*.crdownload",
];

/// Compiled exclusion rules and extension allowlist for one root
#[derive(Debug, Clone)]
pub struct PathFilter {
  root: PathBuf,
  matcher: Gitignore,
  extensions: HashSet<String>,
}

impl PathFilter {
  /// Build the filter for `root`. Invalid patterns are logged and skipped.
  pub fn build(root: &Path, patterns: &[String], extensions: &[String]) -> Self {
    let mut builder = GitignoreBuilder::new(root);

    for pattern in GLOBAL_PATTERNS {
      let _ = builder.add_line(None, pattern);
    }

    for pattern in patterns {
      if let Err(e) = builder.add_line(None, pattern) {
        warn!(pattern = %pattern, error = %e, "Ignoring invalid exclude pattern");
      }
    }

    let ignore_file = root.join(IGNORE_FILE_NAME);
    if ignore_file.exists()
      && let Some(err) = builder.add(&ignore_file)
    {
      warn!(path = %ignore_file.display(), error = %err, "Error parsing ignore file, continuing with partial rules");
    }

    let matcher = builder.build().unwrap_or_else(|e| {
      warn!(root = %root.display(), error = %e, "Failed to compile exclude patterns, using none");
      Gitignore::empty()
    });

    debug!(root = %root.display(), patterns = matcher.num_ignores(), "Path filter built");

    Self {
      root: root.to_path_buf(),
      matcher,
      extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// True if `path` or any of its parents below the root is excluded
  pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
    let Ok(relative) = path.strip_prefix(&self.root) else {
      return true;
    };
    if relative.as_os_str().is_empty() {
      return false;
    }
    self.matcher.matched_path_or_any_parents(relative, is_dir).is_ignore()
  }

  /// True if the extension allowlist admits `path` (empty list admits all)
  pub fn extension_allowed(&self, path: &Path) -> bool {
    if self.extensions.is_empty() {
      return true;
    }
    path
      .extension()
      .map(|e| e.to_string_lossy().to_lowercase())
      .is_some_and(|e| self.extensions.contains(&e))
  }

  /// True if a regular file at `path` should be indexed
  pub fn accepts_file(&self, path: &Path) -> bool {
    !self.is_excluded(path, false) && self.extension_allowed(path)
  }
}

/// Filters for every root plus subtrees that are never indexed
///
/// The data directory is registered as an excluded subtree so that snapshot and
/// journal writes inside a watched root never feed back into the index.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
  filters: Vec<PathFilter>,
  excluded_subtrees: Vec<PathBuf>,
}

impl FilterSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build one filter per root with shared patterns and allowlist
  pub fn build(roots: &[PathBuf], patterns: &[String], extensions: &[String]) -> Self {
    let mut set = Self::new();
    for root in roots {
      set.insert(PathFilter::build(root, patterns, extensions));
    }
    set
  }

  pub fn insert(&mut self, filter: PathFilter) {
    self.filters.push(filter);
    // Deepest root first so nested roots win
    self
      .filters
      .sort_by_key(|f| std::cmp::Reverse(f.root().components().count()));
  }

  pub fn exclude_subtree(&mut self, path: PathBuf) {
    self.excluded_subtrees.push(path);
  }

  /// Filter of the innermost root containing `path`
  pub fn for_path(&self, path: &Path) -> Option<&PathFilter> {
    self.filters.iter().find(|f| path.starts_with(f.root()))
  }

  /// Paths outside every root are excluded
  pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
    if self.excluded_subtrees.iter().any(|s| path.starts_with(s)) {
      return true;
    }
    self.for_path(path).is_none_or(|f| f.is_excluded(path, is_dir))
  }

  pub fn accepts_file(&self, path: &Path) -> bool {
    !self.is_excluded(path, false) && self.for_path(path).is_some_and(|f| f.extension_allowed(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn filter(dir: &TempDir, patterns: &[&str], extensions: &[&str]) -> PathFilter {
    let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
    let extensions: Vec<String> = extensions.iter().map(|s| s.to_string()).collect();
    PathFilter::build(dir.path(), &patterns, &extensions)
  }

  #[test]
  fn test_global_patterns() {
    let dir = TempDir::new().unwrap();
    let f = filter(&dir, &[], &[]);

    assert!(f.is_excluded(&dir.path().join(".git/config"), false));
    assert!(f.is_excluded(&dir.path().join("docs/.DS_Store"), false));
    assert!(f.is_excluded(&dir.path().join("report.docx.part"), false));
    assert!(f.is_excluded(&dir.path().join("~$report.docx"), false));
    assert!(!f.is_excluded(&dir.path().join("report.docx"), false));
  }

  #[test]
  fn test_configured_patterns_match_parents() {
    let dir = TempDir::new().unwrap();
    let f = filter(&dir, &["node_modules/", "*.log"], &[]);

    assert!(f.is_excluded(&dir.path().join("node_modules"), true));
    assert!(f.is_excluded(&dir.path().join("web/node_modules/react/index.js"), false));
    assert!(f.is_excluded(&dir.path().join("logs/app.log"), false));
    assert!(!f.is_excluded(&dir.path().join("src/app.js"), false));
  }

  #[test]
  fn test_root_itself_never_excluded() {
    let dir = TempDir::new().unwrap();
    let f = filter(&dir, &["*"], &[]);
    assert!(!f.is_excluded(dir.path(), true));
  }

  #[test]
  fn test_path_outside_root_excluded() {
    let dir = TempDir::new().unwrap();
    let f = filter(&dir, &[], &[]);
    assert!(f.is_excluded(Path::new("/somewhere/else.txt"), false));
  }

  #[test]
  fn test_ignore_file_loaded() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(IGNORE_FILE_NAME), "# drafts\ndrafts/\n*.secret\n").unwrap();
    let f = filter(&dir, &[], &[]);

    assert!(f.is_excluded(&dir.path().join("drafts/one.txt"), false));
    assert!(f.is_excluded(&dir.path().join("keys.secret"), false));
    assert!(!f.is_excluded(&dir.path().join("final/one.txt"), false));
  }

  #[test]
  fn test_extension_allowlist() {
    let dir = TempDir::new().unwrap();
    let f = filter(&dir, &[], &["txt", ".MD"]);

    assert!(f.accepts_file(&dir.path().join("a.txt")));
    assert!(f.accepts_file(&dir.path().join("b.md")));
    assert!(f.accepts_file(&dir.path().join("C.TXT")));
    assert!(!f.accepts_file(&dir.path().join("d.pdf")));
    assert!(!f.accepts_file(&dir.path().join("Makefile")));
  }

  #[test]
  fn test_filter_set_picks_innermost_root() {
    let outer = TempDir::new().unwrap();
    let inner = outer.path().join("inner");
    fs::create_dir(&inner).unwrap();

    let mut set = FilterSet::new();
    set.insert(PathFilter::build(outer.path(), &[], &[]));
    set.insert(PathFilter::build(&inner, &["*.txt".to_string()], &[]));

    assert!(set.accepts_file(&outer.path().join("a.txt")));
    assert!(!set.accepts_file(&inner.join("a.txt")));
    assert_eq!(set.for_path(&inner.join("x")).unwrap().root(), inner.as_path());
  }

  #[test]
  fn test_filter_set_excluded_subtree() {
    let dir = TempDir::new().unwrap();
    let mut set = FilterSet::build(&[dir.path().to_path_buf()], &[], &[]);
    set.exclude_subtree(dir.path().join(".syncdex"));

    assert!(set.is_excluded(&dir.path().join(".syncdex/snapshots/x.snap"), false));
    assert!(!set.is_excluded(&dir.path().join("notes.txt"), false));
    assert!(set.is_excluded(Path::new("/not/a/root/file.txt"), false));
  }
}
