//! Persistent record of notifications already delivered to the user.
//!
//! Two windows apply: a short TTL decides whether a repeat is suppressed,
//! a longer retention window plus a count cap bound how much is stored.
//! Persistence is best effort; a lost write costs at most one duplicate.
//! Writes run on the blocking pool so callers never wait on storage.

use chrono::Duration;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::format;
use crate::api::types::{NotificationCategory, NotificationItem};
use crate::cache::KvStore;
use crate::clock::SharedClock;
use crate::config::DedupeConfig;

pub const DEDUPE_STORAGE_KEY: &str = "notification_dedupe";

/// Logical identity of a notification, by the most specific rule that applies:
/// 1. the server reference id
/// 2. category-specific stable fields (release: content + episode, social: actor)
/// 3. actor name + rendered title
pub fn derive_key(item: &NotificationItem) -> String {
  let category = item.category.as_str();

  if let Some(reference) = &item.reference {
    return format!("{}:{}", category, reference);
  }

  if item.category == NotificationCategory::EpisodeReleased {
    let content = item
      .data_str("slug")
      .or_else(|| item.data_str("content_id"))
      .or_else(|| item.data_str("anime.slug"));
    if let (Some(content), Some(episode)) = (content, format::episode(item)) {
      return format!("{}:{}:{}", category, content, episode);
    }
  }

  if item.category.is_social() {
    if let Some(actor) = item.actor_id().or_else(|| item.actor_name()) {
      return format!("{}:{}", category, actor);
    }
  }

  format!(
    "{}:{}:{}",
    category,
    item.actor_name().unwrap_or_default(),
    format::render(item).title
  )
}

/// Reference-only identity, independent of the derivation rules.
pub fn reference_key(item: &NotificationItem) -> Option<String> {
  item
    .reference
    .as_ref()
    .map(|reference| format!("ref:{}", reference))
}

/// SHA256 digest for stable, fixed-length stored keys.
fn digest(raw: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(raw.as_bytes());
  hex::encode(hasher.finalize())
}

fn stored_keys(item: &NotificationItem) -> Vec<String> {
  std::iter::once(derive_key(item))
    .chain(reference_key(item))
    .map(|raw| digest(&raw))
    .collect()
}

/// In-memory records plus a counter ordering their snapshots.
#[derive(Default)]
struct RecordSet {
  /// digest → last delivery, unix millis
  entries: HashMap<String, i64>,
  version: u64,
}

/// Delivery-suppression store
pub struct DedupeStore {
  storage: Arc<dyn KvStore>,
  clock: SharedClock,
  ttl: Duration,
  retention: Duration,
  capacity: usize,
  records: Mutex<RecordSet>,
  /// Version of the newest snapshot in storage
  written: Arc<Mutex<u64>>,
  /// Write task for the newest snapshot, with its version
  pending: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl DedupeStore {
  /// Rehydrate from storage, dropping records past the retention window.
  pub fn load(storage: Arc<dyn KvStore>, clock: SharedClock, config: &DedupeConfig) -> Self {
    let store = Self {
      storage,
      clock,
      ttl: Duration::hours(config.ttl_hours),
      retention: Duration::days(config.retention_days),
      capacity: config.capacity.max(1),
      records: Mutex::new(RecordSet::default()),
      written: Arc::new(Mutex::new(0)),
      pending: Mutex::new(None),
    };

    let mut loaded = store.read_persisted();
    let before = loaded.len();
    store.prune(&mut loaded);
    debug!(
      loaded = before,
      kept = loaded.len(),
      "Rehydrated notification dedupe store"
    );
    store.records().entries = loaded;
    store
  }

  fn read_persisted(&self) -> HashMap<String, i64> {
    match self.storage.get(DEDUPE_STORAGE_KEY) {
      Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding unreadable dedupe records");
        HashMap::new()
      }),
      Ok(None) => HashMap::new(),
      Err(e) => {
        warn!(error = %e, "Failed to read dedupe records");
        HashMap::new()
      }
    }
  }

  fn records(&self) -> MutexGuard<'_, RecordSet> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn now_millis(&self) -> i64 {
    self.clock.now().timestamp_millis()
  }

  /// False iff the same logical event was delivered within the TTL.
  pub fn should_deliver(&self, item: &NotificationItem) -> bool {
    let now = self.now_millis();
    let ttl = self.ttl.num_milliseconds();
    let records = self.records();
    !stored_keys(item)
      .iter()
      .filter_map(|key| records.entries.get(key))
      .any(|sent_at| now - sent_at < ttl)
  }

  /// Record a delivery. The in-memory update is complete when this returns;
  /// the write to storage happens later and may fail without consequence
  /// beyond a log line.
  pub fn mark_delivered(&self, item: &NotificationItem) {
    let now = self.now_millis();
    let (snapshot, version) = {
      let mut records = self.records();
      for key in stored_keys(item) {
        records.entries.insert(key, now);
      }
      self.prune(&mut records.entries);
      records.version += 1;
      (records.entries.clone(), records.version)
    };

    debug!(key = %derive_key(item), "Marked notification delivered");
    self.persist(snapshot, version);
  }

  /// Drop records past retention, then the oldest beyond capacity.
  pub fn prune(&self, records: &mut HashMap<String, i64>) {
    let cutoff = self.now_millis() - self.retention.num_milliseconds();
    records.retain(|_, sent_at| *sent_at >= cutoff);

    if records.len() > self.capacity {
      let mut by_recency: Vec<(String, i64)> = records.drain().collect();
      by_recency.sort_by(|a, b| b.1.cmp(&a.1));
      by_recency.truncate(self.capacity);
      records.extend(by_recency);
    }
  }

  /// Hand the snapshot to the blocking pool. Outside a runtime the write
  /// happens inline.
  fn persist(&self, records: HashMap<String, i64>, version: u64) {
    let storage = Arc::clone(&self.storage);
    let written = Arc::clone(&self.written);
    let write = move || write_snapshot(storage.as_ref(), &written, version, &records);

    match Handle::try_current() {
      Ok(runtime) => {
        let task = runtime.spawn_blocking(write);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().map_or(true, |(newest, _)| *newest < version) {
          *pending = Some((version, task));
        }
      }
      Err(_) => write(),
    }
  }

  /// Wait until the latest snapshot has been handed to storage.
  pub async fn flush(&self) {
    let task = self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some((_, task)) = task {
      if let Err(e) = task.await {
        warn!(error = %e, "Dedupe persist task failed");
      }
    }
  }

  pub fn len(&self) -> usize {
    self.records().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records().entries.is_empty()
  }
}

/// Write `records` unless a newer snapshot already landed.
fn write_snapshot(
  storage: &dyn KvStore,
  written: &Mutex<u64>,
  version: u64,
  records: &HashMap<String, i64>,
) {
  let mut written = written.lock().unwrap_or_else(PoisonError::into_inner);
  if *written >= version {
    return;
  }

  let raw = match serde_json::to_string(records) {
    Ok(raw) => raw,
    Err(e) => {
      warn!(error = %e, "Failed to serialize dedupe records");
      return;
    }
  };
  match storage.set(DEDUPE_STORAGE_KEY, &raw) {
    Ok(()) => *written = version,
    Err(e) => warn!(error = %e, "Failed to persist dedupe records"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Initiator;
  use crate::cache::testing::FailingKvStore;
  use crate::cache::MemoryKvStore;
  use crate::clock::testing::ManualClock;
  use chrono::{TimeZone, Utc};
  use serde_json::json;

  fn clock() -> Arc<ManualClock> {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
  }

  fn config(capacity: usize) -> DedupeConfig {
    DedupeConfig {
      ttl_hours: 24,
      retention_days: 7,
      capacity,
    }
  }

  fn store(storage: &Arc<MemoryKvStore>, clock: &Arc<ManualClock>, capacity: usize) -> DedupeStore {
    DedupeStore::load(
      Arc::clone(storage) as Arc<dyn KvStore>,
      Arc::clone(clock) as SharedClock,
      &config(capacity),
    )
  }

  fn release(slug: &str, episode: u32) -> NotificationItem {
    NotificationItem {
      category: NotificationCategory::EpisodeReleased,
      reference: None,
      initiator: None,
      data: json!({"slug": slug, "title_en": "Show", "after": {"episodes_released": episode}}),
      seen: false,
      created: Utc::now(),
    }
  }

  fn follow(id: u32) -> NotificationItem {
    NotificationItem {
      category: NotificationCategory::Follow,
      reference: None,
      initiator: Some(Initiator {
        id: Some(id.to_string()),
        username: Some(format!("user{}", id)),
        avatar: None,
      }),
      data: json!({}),
      seen: false,
      created: Utc::now(),
    }
  }

  fn persisted(storage: &MemoryKvStore) -> HashMap<String, i64> {
    serde_json::from_str(&storage.get(DEDUPE_STORAGE_KEY).unwrap().unwrap()).unwrap()
  }

  #[test]
  fn test_key_derivation_order() {
    let mut item = release("abc", 3);
    assert_eq!(derive_key(&item), "schedule_anime:abc:3");

    item.reference = Some("r-9".into());
    assert_eq!(derive_key(&item), "schedule_anime:r-9");
    assert_eq!(reference_key(&item).as_deref(), Some("ref:r-9"));

    assert_eq!(derive_key(&follow(42)), "follow:42");

    let mut reply = follow(42);
    reply.category = NotificationCategory::CommentReply;
    assert_eq!(derive_key(&reply), "comment_reply:user42:New reply");
  }

  #[test]
  fn test_episode_release_suppressed_within_ttl() {
    let storage = Arc::new(MemoryKvStore::new());
    let clock = clock();
    let store = store(&storage, &clock, 100);

    assert!(store.should_deliver(&release("abc", 5)));
    store.mark_delivered(&release("abc", 5));
    assert!(!store.should_deliver(&release("abc", 5)));
    assert!(store.should_deliver(&release("abc", 6)));

    clock.advance(Duration::hours(24));
    assert!(store.should_deliver(&release("abc", 5)));
  }

  #[test]
  fn test_follow_suppression_is_per_initiator() {
    let storage = Arc::new(MemoryKvStore::new());
    let store = store(&storage, &clock(), 100);

    store.mark_delivered(&follow(42));
    assert!(!store.should_deliver(&follow(42)));
    assert!(store.should_deliver(&follow(43)));
  }

  #[test]
  fn test_reference_key_catches_rederived_items() {
    let storage = Arc::new(MemoryKvStore::new());
    let store = store(&storage, &clock(), 100);

    let mut original = follow(42);
    original.reference = Some("n-1".into());
    store.mark_delivered(&original);

    // Same server item, now reported under a different category tag
    let mut resent = original.clone();
    resent.category = NotificationCategory::Other("follow_v2".into());
    assert!(!store.should_deliver(&resent));
  }

  #[test]
  fn test_capacity_is_never_exceeded() {
    let storage = Arc::new(MemoryKvStore::new());
    let clock = clock();
    let store = store(&storage, &clock, 10);

    for id in 0..40 {
      clock.advance(Duration::seconds(1));
      store.mark_delivered(&follow(id));
      assert!(store.len() <= 10);
      assert!(persisted(&storage).len() <= 10);
    }

    // Newest survive, oldest are evicted
    assert!(!store.should_deliver(&follow(39)));
    assert!(store.should_deliver(&follow(0)));
  }

  #[test]
  fn test_restart_keeps_only_records_within_retention() {
    let storage = Arc::new(MemoryKvStore::new());
    let clock = clock();

    let first = store(&storage, &clock, 100);
    first.mark_delivered(&release("old", 1));
    clock.advance(Duration::days(5));
    first.mark_delivered(&release("young", 1));
    assert_eq!(persisted(&storage).len(), 2);

    clock.advance(Duration::days(3));
    let reloaded = store(&storage, &clock, 100);

    assert_eq!(reloaded.len(), 1);
    // Kept but outside the TTL, so deliverable; still counted as stored
    assert!(reloaded.should_deliver(&release("young", 1)));
    assert!(reloaded.should_deliver(&release("old", 1)));
  }

  #[test]
  fn test_restart_preserves_suppression() {
    let storage = Arc::new(MemoryKvStore::new());
    let clock = clock();

    store(&storage, &clock, 100).mark_delivered(&follow(42));
    clock.advance(Duration::hours(1));

    let reloaded = store(&storage, &clock, 100);
    assert!(!reloaded.should_deliver(&follow(42)));
  }

  #[test]
  fn test_persist_failure_keeps_memory_state() {
    let store = DedupeStore::load(
      Arc::new(FailingKvStore),
      clock() as SharedClock,
      &config(100),
    );

    store.mark_delivered(&follow(1));
    assert!(!store.should_deliver(&follow(1)));
  }

  /// Storage whose writes block until the test releases them.
  struct GatedKvStore {
    inner: MemoryKvStore,
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
  }

  impl KvStore for GatedKvStore {
    fn get(&self, key: &str) -> color_eyre::Result<Option<String>> {
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> color_eyre::Result<()> {
      let _ = self.gate.lock().unwrap().recv();
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> color_eyre::Result<()> {
      self.inner.remove(key)
    }
  }

  #[tokio::test]
  async fn test_mark_delivered_does_not_wait_for_storage() {
    let (release, gate) = std::sync::mpsc::channel();
    let storage = Arc::new(GatedKvStore {
      inner: MemoryKvStore::new(),
      gate: Mutex::new(gate),
    });
    let store = DedupeStore::load(
      Arc::clone(&storage) as Arc<dyn KvStore>,
      clock() as SharedClock,
      &config(100),
    );

    store.mark_delivered(&follow(1));
    store.mark_delivered(&follow(2));
    assert!(!store.should_deliver(&follow(1)));
    assert!(!store.should_deliver(&follow(2)));
    assert!(storage.inner.get(DEDUPE_STORAGE_KEY).unwrap().is_none());

    release.send(()).unwrap();
    release.send(()).unwrap();
    store.flush().await;
    assert_eq!(persisted(&storage.inner).len(), 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_newest_snapshot_is_what_persists() {
    let storage = Arc::new(MemoryKvStore::new());
    let dedupe = store(&storage, &clock(), 100);

    for id in 0..20 {
      dedupe.mark_delivered(&follow(id));
    }
    dedupe.flush().await;

    assert_eq!(persisted(&storage).len(), 20);
    let reloaded = store(&storage, &clock(), 100);
    assert!(!reloaded.should_deliver(&follow(19)));
  }

  #[test]
  fn test_corrupt_storage_starts_empty() {
    let storage = Arc::new(MemoryKvStore::new());
    storage.set(DEDUPE_STORAGE_KEY, "[1,2").unwrap();
    let store = store(&storage, &clock(), 100);
    assert!(store.is_empty());
  }
}
