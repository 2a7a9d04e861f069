//! In-process cache of per-entity watch and favourite state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::coalescer::RequestCoalescer;
use super::traits::{CacheEvent, Lookup, Operation, RequestKey};
use crate::api::gateway::{EntityGateway, GatewayError, GatewayResult};
use crate::api::types::{FavouriteKind, WatchRecord};

const EVENT_CAPACITY: usize = 64;

/// A cached record. `Watch(None)` means the server has no record.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
  Watch(Option<WatchRecord>),
  Favourite(bool),
}

impl CachedValue {
  fn into_watch(self) -> GatewayResult<Option<WatchRecord>> {
    match self {
      CachedValue::Watch(record) => Ok(record),
      CachedValue::Favourite(_) => Err(GatewayError::Decode(
        "expected a watch record, found a favourite flag".into(),
      )),
    }
  }

  fn into_favourite(self) -> GatewayResult<bool> {
    match self {
      CachedValue::Favourite(favourite) => Ok(favourite),
      CachedValue::Watch(_) => Err(GatewayError::Decode(
        "expected a favourite flag, found a watch record".into(),
      )),
    }
  }
}

#[derive(Default)]
struct CacheState {
  values: HashMap<RequestKey, CachedValue>,
  /// Bumped on every local write or invalidation of a key
  generations: HashMap<RequestKey, u64>,
  /// Bumped by `clear_all`, which also covers keys that were never cached
  epoch: u64,
}

impl CacheState {
  /// Never decreases, and grows on any change that supersedes a fetch.
  fn generation(&self, key: &RequestKey) -> u64 {
    self.epoch + self.generations.get(key).copied().unwrap_or(0)
  }

  fn bump(&mut self, key: &RequestKey) {
    *self.generations.entry(key.clone()).or_insert(0) += 1;
  }
}

/// Authoritative in-process cache for entity state.
///
/// Reads are synchronous. Misses are resolved through a [`RequestCoalescer`]
/// so simultaneous consumers trigger a single gateway call. Writes are
/// applied locally before anything touches the network.
pub struct EntityStateCache {
  gateway: Arc<dyn EntityGateway>,
  state: Mutex<CacheState>,
  coalescer: RequestCoalescer<RequestKey, CachedValue, GatewayError>,
  events: broadcast::Sender<CacheEvent>,
}

impl EntityStateCache {
  pub fn new(gateway: Arc<dyn EntityGateway>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      gateway,
      state: Mutex::new(CacheState::default()),
      coalescer: RequestCoalescer::new(),
      events,
    }
  }

  fn state(&self) -> MutexGuard<'_, CacheState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Receive a [`CacheEvent`] for every mutation.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  fn notify_subscribers(&self, event: CacheEvent) {
    // No receivers is fine
    let _ = self.events.send(event);
  }

  // ==========================================================================
  // Generic operations
  // ==========================================================================

  /// Last known value, without blocking or fetching.
  pub fn read(&self, key: &RequestKey) -> Lookup<CachedValue> {
    match self.state().values.get(key) {
      Some(value) => Lookup::Resolved(value.clone()),
      None => Lookup::Unresolved,
    }
  }

  /// Cached value if present, otherwise fetch it (coalesced) and cache it.
  ///
  /// Negative results are cached. Failures are not, so the next call retries.
  pub async fn resolve(&self, key: RequestKey) -> GatewayResult<CachedValue> {
    let generation = {
      let state = self.state();
      if let Some(value) = state.values.get(&key) {
        return Ok(value.clone());
      }
      state.generation(&key)
    };

    let gateway = Arc::clone(&self.gateway);
    let fetch_key = key.clone();
    let result = self
      .coalescer
      .get_or_fetch(key.clone(), move || fetch_remote(gateway, fetch_key))
      .await;

    match result {
      Ok(value) => Ok(self.store_fetched(&key, generation, value)),
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to resolve entity state");
        Err(e)
      }
    }
  }

  /// Store a fetched value unless a local write or invalidation happened
  /// after the fetch started. Returns the value callers should observe.
  fn store_fetched(&self, key: &RequestKey, generation: u64, value: CachedValue) -> CachedValue {
    let changed = {
      let mut state = self.state();
      if state.generation(key) != generation {
        debug!(key = %key, "Discarding fetch superseded by a local change");
        return state.values.get(key).cloned().unwrap_or(value);
      }
      let previous = state.values.insert(key.clone(), value.clone());
      previous.as_ref() != Some(&value)
    };

    if changed {
      self.notify_subscribers(CacheEvent::Updated(key.clone()));
    }
    value
  }

  /// Optimistic local update; always applied immediately.
  pub fn write(&self, key: RequestKey, value: CachedValue) {
    {
      let mut state = self.state();
      state.bump(&key);
      state.values.insert(key.clone(), value);
    }
    debug!(key = %key, "Applied local write");
    self.notify_subscribers(CacheEvent::Updated(key));
  }

  /// Drop one record so the next resolve refetches it, even if a fetch for
  /// it is already in flight.
  pub fn invalidate(&self, key: &RequestKey) {
    let removed = {
      let mut state = self.state();
      state.bump(key);
      state.values.remove(key).is_some()
    };
    self.coalescer.forget(key);
    if removed {
      self.notify_subscribers(CacheEvent::Invalidated(key.clone()));
    }
  }

  /// Drop everything, in-flight fetches included.
  pub fn clear_all(&self) {
    {
      let mut state = self.state();
      state.epoch += 1;
      state.values.clear();
    }
    self.coalescer.forget_all();
    self.notify_subscribers(CacheEvent::Cleared);
  }

  // ==========================================================================
  // Watch records
  // ==========================================================================

  pub fn read_watch(&self, key: &str) -> Lookup<Option<WatchRecord>> {
    match self.read(&RequestKey::watch(key)) {
      Lookup::Resolved(CachedValue::Watch(record)) => Lookup::Resolved(record),
      _ => Lookup::Unresolved,
    }
  }

  /// Episode progress; an absent record has no progress.
  pub fn read_progress(&self, key: &str) -> Lookup<u32> {
    match self.read_watch(key) {
      Lookup::Resolved(record) => Lookup::Resolved(record.map(|r| r.episodes).unwrap_or(0)),
      Lookup::Unresolved => Lookup::Unresolved,
    }
  }

  pub async fn resolve_watch(&self, key: &str) -> GatewayResult<Option<WatchRecord>> {
    self.resolve(RequestKey::watch(key)).await?.into_watch()
  }

  /// Replace the watch record. `None` clears it, progress included.
  pub fn write_watch(&self, key: &str, record: Option<WatchRecord>) {
    self.write(RequestKey::watch(key), CachedValue::Watch(record));
  }

  // ==========================================================================
  // Favourites
  // ==========================================================================

  pub fn read_favourite(&self, kind: FavouriteKind, key: &str) -> Lookup<bool> {
    match self.read(&RequestKey::favourite(kind, key)) {
      Lookup::Resolved(CachedValue::Favourite(favourite)) => Lookup::Resolved(favourite),
      _ => Lookup::Unresolved,
    }
  }

  pub async fn resolve_favourite(&self, kind: FavouriteKind, key: &str) -> GatewayResult<bool> {
    self
      .resolve(RequestKey::favourite(kind, key))
      .await?
      .into_favourite()
  }

  pub fn write_favourite(&self, kind: FavouriteKind, key: &str, favourite: bool) {
    self.write(
      RequestKey::favourite(kind, key),
      CachedValue::Favourite(favourite),
    );
  }
}

async fn fetch_remote(
  gateway: Arc<dyn EntityGateway>,
  key: RequestKey,
) -> GatewayResult<CachedValue> {
  match key.operation {
    Operation::Watch => gateway.get_watch(&key.key).await.map(CachedValue::Watch),
    Operation::Favourite(kind) => gateway
      .get_favourite(kind, &key.key)
      .await
      .map(CachedValue::Favourite),
  }
}
