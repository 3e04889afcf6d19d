//! Change detection and synchronization between file-system roots and a
//! full-text index.
//!
//! Local roots are watched live:
//!
//! ```text
//! RecursiveWatcher → Debouncer → IndexWorker → IndexGateway
//! ```
//!
//! Network roots are re-scanned on a timer and diffed against the last stored
//! snapshot:
//!
//! ```text
//! NetworkPoller → SnapshotStore (diff) → IndexGateway → SnapshotStore (save)
//! ```

pub mod daemon;
pub mod debounce;
pub mod document;
pub mod extract;
pub mod filter;
pub mod gateway;
pub mod live;
pub mod mutation;
pub mod poller;
pub mod snapshot;
pub mod stability;
pub mod watcher;

pub use daemon::{DaemonError, SyncDaemon};
pub use debounce::{DebounceQueue, Debouncer};
pub use document::Document;
pub use extract::{Extractor, TextExtractor};
pub use filter::{FilterSet, PathFilter};
pub use gateway::{GatewayError, IndexGateway, JournalIndex, MemoryIndex};
pub use live::{IndexJob, LiveIndexService, LiveSettings, WorkerHandle};
pub use mutation::{MutationError, Mutator, UpsertOutcome};
pub use poller::{NetworkPoller, PollError, PollStats, PollerConfig};
pub use snapshot::{Snapshot, SnapshotDiff, SnapshotEntry, SnapshotError, SnapshotStore};
pub use stability::{StabilityConfig, wait_stable};
pub use watcher::{ChangeKind, FileChange, RecursiveWatcher, WatcherError};
