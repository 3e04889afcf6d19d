//! Network poller tests: snapshot diffing, persistence and replay.

mod common;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use common::SyncTestContext;
use index::{Extractor, NetworkPoller, PollError, PollerConfig, SnapshotEntry};
use pretty_assertions::assert_eq;
use tokio::sync::{Notify, Semaphore};

/// Holds every extraction until the test hands out a permit
struct GatedExtractor {
  started: Arc<Notify>,
  release: Arc<Semaphore>,
}

#[async_trait::async_trait]
impl Extractor for GatedExtractor {
  async fn extract(&self, _path: &Path, _timeout: Duration) -> String {
    self.started.notify_one();
    let _permit = self.release.acquire().await.expect("semaphore open");
    "gated".to_string()
  }
}

#[tokio::test]
async fn test_first_poll_indexes_everything() {
  let ctx = SyncTestContext::new();
  ctx.write_file("a.txt", "alpha");
  ctx.write_file("docs/b.txt", "beta");

  let stats = ctx.poller().poll_now().await;

  assert_eq!(stats.scanned, 2);
  assert_eq!(stats.created, 2);
  assert_eq!(ctx.index.paths(), vec![ctx.key("a.txt"), ctx.key("docs/b.txt")]);
}

#[tokio::test]
async fn test_diff_created_deleted_and_persisted_snapshot() {
  let ctx = SyncTestContext::new();
  let a = ctx.write_file_at("a", &"x".repeat(100), 1_000);
  ctx.write_file_at("b", &"y".repeat(50), 2_000);
  let poller = ctx.poller();
  poller.poll_now().await;

  ctx.remove_file("b");
  let c = ctx.write_file_at("c", &"z".repeat(10), 3_000);
  let stats = poller.poll_now().await;

  assert_eq!((stats.created, stats.modified, stats.deleted), (1, 0, 1));
  assert_eq!(ctx.index.paths(), vec![ctx.key("a"), ctx.key("c")]);

  let stored = ctx.store().load(&ctx.root).await.unwrap();
  let mut entries: Vec<(PathBuf, SnapshotEntry)> = stored.into_iter().collect();
  entries.sort_by(|x, y| x.0.cmp(&y.0));
  assert_eq!(
    entries,
    vec![
      (a, SnapshotEntry::new(100, 1_000_000)),
      (c, SnapshotEntry::new(10, 3_000_000)),
    ]
  );
}

#[tokio::test]
async fn test_unchanged_tree_produces_no_mutations() {
  let ctx = SyncTestContext::new();
  ctx.write_file_at("stable.txt", "same", 5_000);
  let poller = ctx.poller();
  poller.poll_now().await;
  let before = ctx.index.stats();

  let stats = poller.poll_now().await;

  assert_eq!(stats.changes(), 0);
  assert_eq!(stats.scanned, 1);
  assert_eq!(ctx.index.stats().upserts, before.upserts);
}

#[tokio::test]
async fn test_modified_file_reindexed() {
  let ctx = SyncTestContext::new();
  ctx.write_file_at("notes.txt", "first", 1_000);
  let poller = ctx.poller();
  poller.poll_now().await;

  ctx.write_file_at("notes.txt", "second draft", 2_000);
  let stats = poller.poll_now().await;

  assert_eq!(stats.modified, 1);
  assert_eq!(ctx.index.get(&ctx.key("notes.txt")).unwrap().content, "second draft");
}

#[tokio::test]
async fn test_replay_after_crash_before_save_is_idempotent() {
  let ctx = SyncTestContext::new();
  ctx.write_file_at("keep.txt", "keep", 1_000);
  ctx.write_file_at("drop.txt", "drop", 1_000);
  let poller = ctx.poller();
  poller.poll_now().await;
  let saved = ctx.store().load(&ctx.root).await.unwrap();

  ctx.remove_file("drop.txt");
  ctx.write_file_at("new.txt", "new", 2_000);
  poller.poll_now().await;
  let after_once = ctx.index.paths();

  // Simulate a crash between applying mutations and saving the snapshot
  ctx.store().save(&ctx.root, &saved).await.unwrap();
  let restarted = ctx.poller();
  let stats = restarted.poll_now().await;

  assert_eq!((stats.created, stats.deleted), (1, 1));
  assert_eq!(ctx.index.paths(), after_once);
  assert_eq!(ctx.index.len(), 2);
}

#[tokio::test]
async fn test_unavailable_root_keeps_snapshot() {
  let ctx = SyncTestContext::new();
  let share = ctx.path("share");
  ctx.write_file("share/report.txt", "q3");
  let store = ctx.store();
  let poller = index::NetworkPoller::new(vec![share.clone()], ctx.filters(), store.clone(), ctx.mutator());
  poller.poll_now().await;

  std::fs::remove_dir_all(&share).unwrap();
  let result = poller.poll_root(&share).await;

  assert!(matches!(result, Err(PollError::RootUnavailable(_))));
  assert_eq!(store.load(&share).await.unwrap().len(), 1);
  assert_eq!(ctx.index.len(), 1);
}

#[tokio::test]
async fn test_concurrent_polls_do_not_double_apply() {
  let ctx = SyncTestContext::new();
  for i in 0..10 {
    ctx.write_file(&format!("f{i}.txt"), "content");
  }
  let poller = ctx.poller();

  let first = poller.poll_now_spawned();
  let second = poller.poll_now_spawned();
  let (first, second) = (first.await.unwrap(), second.await.unwrap());

  // The second cycle waits for the first and then sees no changes
  assert_eq!(first.created + second.created, 10);
  assert_eq!(ctx.index.stats().upserts, 10);
}

#[tokio::test]
async fn test_last_stats_recorded() {
  let ctx = SyncTestContext::new();
  ctx.write_file("a.txt", "a");
  let poller = ctx.poller();
  assert!(poller.last_stats().await.is_none());

  let stats = poller.poll_now().await;

  assert_eq!(poller.last_stats().await, Some(stats));
}

#[tokio::test]
async fn test_scheduled_poll_runs_after_initial_delay() {
  let ctx = SyncTestContext::new();
  ctx.write_file("scheduled.txt", "tick");
  let poller = ctx.poller();

  let schedule = poller.start(PollerConfig {
    interval: Duration::from_secs(60),
    initial_delay: Duration::from_millis(50),
  });

  let key = ctx.key("scheduled.txt");
  assert!(common::wait_until(Duration::from_secs(5), || ctx.index.contains(&key)).await);

  poller.close(schedule).await;
}

#[tokio::test]
async fn test_close_lets_running_cycle_finish_and_save() {
  let ctx = SyncTestContext::new();
  let file = ctx.write_file_at("slow.txt", "slow share", 1_000);
  let started = Arc::new(Notify::new());
  let release = Arc::new(Semaphore::new(0));
  let extractor = GatedExtractor {
    started: started.clone(),
    release: release.clone(),
  };
  let store = ctx.store();
  let poller = NetworkPoller::new(
    vec![ctx.root.clone()],
    ctx.filters(),
    store.clone(),
    ctx.mutator_with(Arc::new(extractor)),
  );

  let schedule = poller.start(PollerConfig {
    interval: Duration::from_secs(60),
    initial_delay: Duration::from_millis(10),
  });
  tokio::time::timeout(Duration::from_secs(5), started.notified())
    .await
    .expect("cycle never reached extraction");

  // Shutdown arrives while the cycle is blocked mid-apply
  poller.stop();
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert!(!schedule.is_finished());
  assert!(store.load(&ctx.root).await.unwrap().is_empty());

  release.add_permits(1);
  tokio::time::timeout(Duration::from_secs(5), poller.close(schedule))
    .await
    .expect("close did not return");

  let saved = store.load(&ctx.root).await.unwrap();
  assert_eq!(saved.get(&file), Some(&SnapshotEntry::new(10, 1_000_000)));
  assert_eq!(ctx.index.get(&ctx.key("slow.txt")).unwrap().content, "gated");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_file_name_is_stable_across_polls() {
  use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

  let ctx = SyncTestContext::new();
  let path = ctx.root.join(OsStr::from_bytes(b"caf\xe9.txt"));
  std::fs::write(&path, "latin-1 name").unwrap();
  let poller = ctx.poller();

  let first = poller.poll_now().await;
  let second = poller.poll_now().await;

  assert_eq!(first.created, 1);
  assert_eq!(second.changes(), 0);
  assert_eq!(ctx.index.len(), 1);
  assert_eq!(ctx.index.stats().deletes, 0);
  assert!(ctx.store().load(&ctx.root).await.unwrap().contains_key(&path));
}
