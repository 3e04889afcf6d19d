//! RecursiveWatcher - per-directory change notifications for local roots
//!
//! Every directory under a root gets its own non-recursive registration, kept
//! in a table keyed by path. When a directory is created the watcher walks the
//! new subtree and registers it before forwarding anything, so files written
//! into a fresh directory are never missed.
//!
//! # Design
//!
//! The watcher bridges the sync notify callbacks with the async pipeline:
//! 1. notify's sync callback uses `blocking_send` to forward events to a channel
//! 2. `run()` consumes that channel until cancelled
//! 3. Directory creates/deletes update the registration table
//! 4. File events become [`FileChange`]s sent to the debouncer
//!
//! Directories are structural: they are never emitted as content changes,
//! except that deleting a registered directory forwards a directory DELETE so
//! the index can drop everything beneath it.
//!
//! # Lifecycle
//!
//! The watcher runs until:
//! - The `CancellationToken` is triggered
//! - The event channel closes
//!
//! On exit every registration is released.

use std::{
  collections::{HashMap, HashSet},
  path::{Path, PathBuf},
};

use notify::{
  Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RemoveKind, RenameMode},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::filter::FilterSet;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in the watcher
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch root {path}: {source}")]
  WatchRoot {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },
}

// ============================================================================
// Change Types
// ============================================================================

/// Raw change kinds forwarded downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
  Create,
  Modify,
  Delete,
}

/// A change to a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
  pub path: PathBuf,
  pub kind: ChangeKind,
  /// Set only for the DELETE of a directory; the whole subtree goes with it
  pub directory: bool,
}

impl FileChange {
  pub fn new(path: PathBuf, kind: ChangeKind) -> Self {
    Self {
      path,
      kind,
      directory: false,
    }
  }

  pub fn directory_deleted(path: PathBuf) -> Self {
    Self {
      path,
      kind: ChangeKind::Delete,
      directory: true,
    }
  }
}

/// One subscribed directory
#[derive(Debug, Clone)]
struct WatchRegistration {
  root: PathBuf,
}

// ============================================================================
// RecursiveWatcher
// ============================================================================

pub struct RecursiveWatcher {
  roots: Vec<PathBuf>,
  filters: FilterSet,
  // Holds the OS subscriptions; dropping it releases them
  watcher: RecommendedWatcher,
  event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
  registrations: HashMap<PathBuf, WatchRegistration>,
  // Directories that could not be watched; their deletes still drop the subtree
  unwatched: HashSet<PathBuf>,
  output: mpsc::Sender<FileChange>,
  cancel: CancellationToken,
}

impl RecursiveWatcher {
  /// Open the notification channel and register every directory under `roots`.
  ///
  /// Failing to open the channel or to watch a root is fatal. Failing to watch
  /// an individual subdirectory is logged and skipped.
  pub fn new(
    roots: Vec<PathBuf>,
    filters: FilterSet,
    output: mpsc::Sender<FileChange>,
    cancel: CancellationToken,
  ) -> Result<Self, WatcherError> {
    let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(1024);

    let watcher = RecommendedWatcher::new(
      move |res| {
        // Runs on notify's thread; blocks when the pipeline is saturated
        let _ = event_tx.blocking_send(res);
      },
      Config::default(),
    )
    .map_err(WatcherError::Init)?;

    let mut this = Self {
      roots: roots.clone(),
      filters,
      watcher,
      event_rx,
      registrations: HashMap::new(),
      unwatched: HashSet::new(),
      output,
      cancel,
    };

    for root in &roots {
      this
        .watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|source| WatcherError::WatchRoot {
          path: root.clone(),
          source,
        })?;
      this.registrations.insert(root.clone(), WatchRegistration { root: root.clone() });

      // Existing files are not announced; they were indexed by an earlier run
      let _ = this.register_tree(root, root);
      info!(root = %root.display(), "Watching local root");
    }

    info!(
      roots = roots.len(),
      directories = this.registrations.len(),
      "Recursive watcher initialized"
    );

    Ok(this)
  }

  /// Spawn the dispatch loop
  pub fn spawn(self) -> tokio::task::JoinHandle<()> {
    tokio::spawn(self.run())
  }

  pub fn registration_count(&self) -> usize {
    self.registrations.len()
  }

  pub fn is_registered(&self, dir: &Path) -> bool {
    self.registrations.contains_key(dir)
  }

  /// Dispatch loop; returns after cancellation or when notify goes away
  pub async fn run(mut self) {
    info!(roots = self.roots.len(), "RecursiveWatcher started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("RecursiveWatcher shutting down (cancelled)");
              break;
          }

          event = self.event_rx.recv() => {
              match event {
                  Some(Ok(event)) => {
                      if !self.handle_event(event).await {
                          info!("RecursiveWatcher shutting down (consumer gone)");
                          break;
                      }
                  }
                  Some(Err(e)) => {
                      warn!(error = %e, "Watcher error");
                  }
                  None => {
                      info!("RecursiveWatcher shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    self.release_all();
    info!("RecursiveWatcher stopped");
  }

  // ========================================================================
  // Registration
  // ========================================================================

  fn root_of(&self, path: &Path) -> Option<PathBuf> {
    self
      .roots
      .iter()
      .filter(|r| path.starts_with(r))
      .max_by_key(|r| r.components().count())
      .cloned()
  }

  fn register_dir(&mut self, dir: &Path, root: &Path) {
    if self.registrations.contains_key(dir) {
      return;
    }
    match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
      Ok(()) => {
        trace!(dir = %dir.display(), "Registered directory");
        self.unwatched.remove(dir);
        self.registrations.insert(
          dir.to_path_buf(),
          WatchRegistration {
            root: root.to_path_buf(),
          },
        );
      }
      Err(e) => {
        warn!(dir = %dir.display(), error = %e, "Failed to watch directory, skipping");
        self.unwatched.insert(dir.to_path_buf());
      }
    }
  }

  /// Register `top` and every non-excluded directory below it.
  ///
  /// Returns the accepted regular files found along the way.
  fn register_tree(&mut self, top: &Path, root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let filters = self.filters.clone();

    let walker = walkdir::WalkDir::new(top)
      .follow_links(false)
      .into_iter()
      .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !filters.is_excluded(e.path(), true));

    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
          debug!(error = %e, "Skipping unreadable entry during registration");
          continue;
        }
      };

      if entry.file_type().is_dir() {
        self.register_dir(entry.path(), root);
      } else if entry.file_type().is_file() && filters.accepts_file(entry.path()) {
        files.push(entry.into_path());
      }
    }

    files
  }

  /// Drop registrations for `dir` and everything below it
  fn release_tree(&mut self, dir: &Path) -> usize {
    let doomed: Vec<PathBuf> = self
      .registrations
      .keys()
      .filter(|p| p.starts_with(dir))
      .cloned()
      .collect();

    for path in &doomed {
      // The OS usually dropped the watch with the directory already
      if let Err(e) = self.watcher.unwatch(path) {
        trace!(dir = %path.display(), error = %e, "Unwatch after delete");
      }
      self.registrations.remove(path);
    }
    self.unwatched.retain(|p| !p.starts_with(dir));

    doomed.len()
  }

  fn release_all(&mut self) {
    let count = self.registrations.len();
    for path in self.registrations.keys() {
      let _ = self.watcher.unwatch(path);
    }
    self.registrations.clear();
    debug!(released = count, "Released all watch registrations");
  }

  // ========================================================================
  // Event Handling
  // ========================================================================

  async fn forward(&self, change: FileChange) -> bool {
    trace!(path = %change.path.display(), kind = ?change.kind, directory = change.directory, "Forwarding change");
    self.output.send(change).await.is_ok()
  }

  /// Process one notify event. Returns false once the consumer is gone.
  pub(crate) async fn handle_event(&mut self, event: Event) -> bool {
    match event.kind {
      EventKind::Create(_) => {
        for path in &event.paths {
          if !self.on_created(path).await {
            return false;
          }
        }
      }
      EventKind::Modify(ModifyKind::Name(mode)) => match mode {
        RenameMode::Both if event.paths.len() >= 2 => {
          if !self.on_removed(&event.paths[0], false).await {
            return false;
          }
          if !self.on_created(&event.paths[1]).await {
            return false;
          }
        }
        RenameMode::From => {
          for path in &event.paths {
            if !self.on_removed(path, false).await {
              return false;
            }
          }
        }
        _ => {
          // "To" or an unpaired rename: the path tells us which side we saw
          for path in &event.paths {
            let alive = if path.symlink_metadata().is_ok() {
              self.on_created(path).await
            } else {
              self.on_removed(path, false).await
            };
            if !alive {
              return false;
            }
          }
        }
      },
      EventKind::Modify(_) => {
        for path in &event.paths {
          if path.is_dir() || !self.filters.accepts_file(path) {
            trace!(path = %path.display(), "Ignoring modify");
            continue;
          }
          debug!(file = %path.display(), "File modified");
          if !self.forward(FileChange::new(path.clone(), ChangeKind::Modify)).await {
            return false;
          }
        }
      }
      EventKind::Remove(kind) => {
        let folder = kind == RemoveKind::Folder;
        for path in &event.paths {
          if !self.on_removed(path, folder).await {
            return false;
          }
        }
      }
      EventKind::Access(_) | EventKind::Any | EventKind::Other => {
        trace!(kind = ?event.kind, "Ignoring event");
      }
    }

    true
  }

  async fn on_created(&mut self, path: &Path) -> bool {
    if path.is_dir() {
      if self.filters.is_excluded(path, true) {
        trace!(dir = %path.display(), "Skipping excluded directory");
        return true;
      }
      let Some(root) = self.root_of(path) else {
        return true;
      };

      // Register before forwarding anything so children cannot slip by
      let files = self.register_tree(path, &root);
      debug!(dir = %path.display(), files = files.len(), "Directory created, subtree registered");

      for file in files {
        if !self.forward(FileChange::new(file, ChangeKind::Create)).await {
          return false;
        }
      }
      return true;
    }

    if !self.filters.accepts_file(path) {
      trace!(path = %path.display(), "Skipping excluded file");
      return true;
    }

    debug!(file = %path.display(), "File created");
    self.forward(FileChange::new(path.to_path_buf(), ChangeKind::Create)).await
  }

  /// `folder` is set when the notification itself says a directory went away
  async fn on_removed(&mut self, path: &Path, folder: bool) -> bool {
    if self.registrations.contains_key(path) {
      let root = self.registrations.get(path).map(|r| r.root.clone());
      let released = self.release_tree(path);
      debug!(dir = %path.display(), released, root = ?root, "Directory deleted");
      return self.forward(FileChange::directory_deleted(path.to_path_buf())).await;
    }

    if self.filters.is_excluded(path, folder) {
      trace!(path = %path.display(), "Skipping excluded delete");
      return true;
    }

    if folder || self.unwatched.contains(path) {
      self.release_tree(path);
      debug!(dir = %path.display(), "Unregistered directory deleted");
      return self.forward(FileChange::directory_deleted(path.to_path_buf())).await;
    }

    debug!(file = %path.display(), "File deleted");
    self.forward(FileChange::new(path.to_path_buf(), ChangeKind::Delete)).await
  }
}
