//! Durable per-root listing of `path -> (size, mtime)`.
//!
//! A snapshot reflects the tree as observed at the end of the last completed
//! poll of a root. The next poll diffs a fresh walk against it to find created,
//! modified and deleted files.
//!
//! ## Record format
//!
//! One file per root under the snapshot directory, named by the SHA-256 of the
//! canonical root path. Content is newline-delimited `path|size|mtime` with the
//! mtime in milliseconds since the Unix epoch. Fields are split from the right,
//! so a `|` inside a path is preserved.
//!
//! Paths are stored as their raw OS bytes. `%`, line breaks and bytes that are
//! not valid UTF-8 are written as `%XX`, so decoding rebuilds the exact path the
//! walk produced, including names that are not valid UTF-8.
//!
//! `save` writes a sibling temp file and renames it over the record, so a crash
//! never leaves a truncated snapshot behind.

use std::{
  collections::{BTreeSet, HashMap},
  fmt::Write as _,
  fs::Metadata,
  path::{Path, PathBuf},
  time::UNIX_EPOCH,
};

use sha2::{Digest, Sha256};
use syncdex_core::normalize_path;
use tracing::{debug, trace, warn};

/// Last observed state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
  pub size: u64,
  pub mtime_millis: i64,
}

impl SnapshotEntry {
  pub fn new(size: u64, mtime_millis: i64) -> Self {
    Self { size, mtime_millis }
  }

  pub fn from_metadata(metadata: &Metadata) -> Self {
    Self::new(metadata.len(), mtime_millis(metadata))
  }
}

pub type Snapshot = HashMap<PathBuf, SnapshotEntry>;

/// Modification time in milliseconds since the epoch, 0 if unavailable
pub fn mtime_millis(metadata: &Metadata) -> i64 {
  metadata
    .modified()
    .ok()
    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
  #[error("Failed to create snapshot directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to read snapshot {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to write snapshot {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

// ============================================================================
// Diff
// ============================================================================

/// Changes between two snapshots of the same root, each list sorted by path
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
  pub created: Vec<PathBuf>,
  pub modified: Vec<PathBuf>,
  pub deleted: Vec<PathBuf>,
}

impl SnapshotDiff {
  /// Classify every path in the union of `old` and `new`
  pub fn compute(old: &Snapshot, new: &Snapshot) -> Self {
    let paths: BTreeSet<&PathBuf> = old.keys().chain(new.keys()).collect();
    let mut diff = Self::default();

    for path in paths {
      match (old.get(path), new.get(path)) {
        (None, Some(_)) => diff.created.push(path.clone()),
        (Some(_), None) => diff.deleted.push(path.clone()),
        (Some(before), Some(after)) if before != after => diff.modified.push(path.clone()),
        _ => {}
      }
    }

    diff
  }

  pub fn change_count(&self) -> usize {
    self.created.len() + self.modified.len() + self.deleted.len()
  }

  pub fn is_empty(&self) -> bool {
    self.change_count() == 0
  }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize a snapshot, sorted by encoded path for stable output
pub fn encode(snapshot: &Snapshot) -> String {
  let mut lines: Vec<(String, &SnapshotEntry)> = snapshot
    .iter()
    .filter_map(|(p, e)| match encode_path(p) {
      Some(encoded) => Some((encoded, e)),
      None => {
        warn!(path = %p.display(), "Skipping path that cannot be stored");
        None
      }
    })
    .collect();
  lines.sort_by(|a, b| a.0.cmp(&b.0));

  let mut out = String::with_capacity(lines.len() * 64);
  for (path, entry) in lines {
    let _ = writeln!(out, "{}|{}|{}", path, entry.size, entry.mtime_millis);
  }
  out
}

/// Parse a snapshot record. Malformed lines are skipped.
pub fn decode(content: &str) -> Snapshot {
  let mut snapshot = Snapshot::new();

  for line in content.lines() {
    if line.is_empty() {
      continue;
    }
    let mut fields = line.rsplitn(3, '|');
    let (Some(mtime), Some(size), Some(path)) = (fields.next(), fields.next(), fields.next()) else {
      trace!(line = %line, "Skipping malformed snapshot line");
      continue;
    };
    let (Ok(size), Ok(mtime)) = (size.parse::<u64>(), mtime.parse::<i64>()) else {
      trace!(line = %line, "Skipping snapshot line with bad numbers");
      continue;
    };
    let Some(path) = decode_path(path) else {
      trace!(line = %line, "Skipping snapshot line with bad path escape");
      continue;
    };
    snapshot.insert(path, SnapshotEntry::new(size, mtime));
  }

  snapshot
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Option<&[u8]> {
  use std::os::unix::ffi::OsStrExt;
  Some(path.as_os_str().as_bytes())
}

// Elsewhere only paths with a UTF-8 form can be rebuilt exactly
#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Option<&[u8]> {
  path.to_str().map(str::as_bytes)
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
  use std::os::unix::ffi::OsStringExt;
  Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
  String::from_utf8(bytes).ok().map(PathBuf::from)
}

fn encode_path(path: &Path) -> Option<String> {
  let bytes = path_bytes(path)?;
  let mut out = String::with_capacity(bytes.len());

  for chunk in bytes.utf8_chunks() {
    for c in chunk.valid().chars() {
      match c {
        '%' | '\n' | '\r' => {
          let _ = write!(out, "%{:02X}", c as u32);
        }
        c => out.push(c),
      }
    }
    for byte in chunk.invalid() {
      let _ = write!(out, "%{byte:02X}");
    }
  }
  Some(out)
}

fn decode_path(encoded: &str) -> Option<PathBuf> {
  let raw = encoded.as_bytes();
  let mut bytes = Vec::with_capacity(raw.len());
  let mut i = 0;

  while i < raw.len() {
    if raw[i] == b'%' {
      let hi = hex_value(*raw.get(i + 1)?)?;
      let lo = hex_value(*raw.get(i + 2)?)?;
      bytes.push((hi << 4) | lo);
      i += 3;
    } else {
      bytes.push(raw[i]);
      i += 1;
    }
  }

  path_from_bytes(bytes)
}

fn hex_value(digit: u8) -> Option<u8> {
  match digit {
    b'0'..=b'9' => Some(digit - b'0'),
    b'a'..=b'f' => Some(digit - b'a' + 10),
    b'A'..=b'F' => Some(digit - b'A' + 10),
    _ => None,
  }
}

// ============================================================================
// Store
// ============================================================================

/// Directory of snapshot records, one per root
#[derive(Debug, Clone)]
pub struct SnapshotStore {
  dir: PathBuf,
}

impl SnapshotStore {
  /// Open the store, creating its directory. Failure here is fatal to the poller.
  pub fn open(dir: &Path) -> Result<Self, SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|source| SnapshotError::CreateDir {
      path: dir.to_path_buf(),
      source,
    })?;
    Ok(Self { dir: dir.to_path_buf() })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Record file for `root`; the same root maps to the same file across runs
  pub fn record_path(&self, root: &Path) -> PathBuf {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(normalize_path(&canonical).as_bytes());
    self.dir.join(format!("{}.snap", hex::encode(digest)))
  }

  /// Load the last snapshot of `root`; a missing record is an empty snapshot
  pub async fn load(&self, root: &Path) -> Result<Snapshot, SnapshotError> {
    let path = self.record_path(root);
    match tokio::fs::read_to_string(&path).await {
      Ok(content) => {
        let snapshot = decode(&content);
        debug!(root = %root.display(), entries = snapshot.len(), "Loaded snapshot");
        Ok(snapshot)
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(root = %root.display(), "No snapshot yet, starting empty");
        Ok(Snapshot::new())
      }
      Err(source) => Err(SnapshotError::Read { path, source }),
    }
  }

  /// Replace the stored snapshot of `root` with `snapshot`
  pub async fn save(&self, root: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = self.record_path(root);
    let tmp = path.with_extension("snap.tmp");
    let content = encode(snapshot);

    let write = async {
      tokio::fs::write(&tmp, content.as_bytes()).await?;
      tokio::fs::rename(&tmp, &path).await
    };
    write.await.map_err(|source| SnapshotError::Write {
      path: path.clone(),
      source,
    })?;

    debug!(root = %root.display(), entries = snapshot.len(), "Saved snapshot");
    Ok(())
  }
}
