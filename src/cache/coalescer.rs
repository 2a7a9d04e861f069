//! At most one in-flight fetch per key; concurrent callers share its outcome.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A pending fetch that later callers can join
struct InFlightRequest<V, E> {
  /// Distinguishes this request from a later one under the same key
  id: u64,
  future: SharedFetch<V, E>,
  started_at: Instant,
}

type Registry<K, V, E> = Arc<Mutex<HashMap<K, InFlightRequest<V, E>>>>;

/// Merges concurrent requests for the same key into one underlying operation.
///
/// The entry is removed as soon as the fetch settles, before any waiter sees
/// the result, so a failure never poisons later calls.
pub struct RequestCoalescer<K, V, E> {
  in_flight: Registry<K, V, E>,
  next_id: AtomicU64,
}

impl<K, V, E> RequestCoalescer<K, V, E>
where
  K: Eq + Hash + Clone + Display + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
  E: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      next_id: AtomicU64::new(0),
    }
  }

  fn registry(&self) -> MutexGuard<'_, HashMap<K, InFlightRequest<V, E>>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Join the in-flight request for `key`, or start one with `fetch`.
  ///
  /// `fetch` is only called when nothing is in flight. It must build its
  /// future without touching this coalescer.
  pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    let future = {
      let mut in_flight = self.registry();

      if let Some(existing) = in_flight.get(&key) {
        debug!(
          key = %key,
          waited_ms = existing.started_at.elapsed().as_millis() as u64,
          "Joining in-flight request"
        );
        existing.future.clone()
      } else {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        let registry = Arc::clone(&self.in_flight);
        let entry_key = key.clone();
        let pending = fetch();

        let future = async move {
          let result = pending.await;
          {
            let mut in_flight = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.get(&entry_key).is_some_and(|entry| entry.id == id) {
              in_flight.remove(&entry_key);
            }
          }
          debug!(
            key = %entry_key,
            duration_ms = started_at.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Completed coalesced request"
          );
          result
        }
        .boxed()
        .shared();

        in_flight.insert(
          key,
          InFlightRequest {
            id,
            future: future.clone(),
            started_at,
          },
        );
        future
      }
    };

    future.await
  }

  /// Detach the in-flight request for `key` so the next call starts a new
  /// fetch. Current waiters still get the detached result.
  pub fn forget(&self, key: &K) {
    if self.registry().remove(key).is_some() {
      debug!(key = %key, "Detached in-flight request");
    }
  }

  /// Detach every in-flight request.
  pub fn forget_all(&self) {
    self.registry().clear();
  }

  /// Number of requests currently in flight.
  #[cfg(test)]
  pub fn in_flight_count(&self) -> usize {
    self.registry().len()
  }

  #[cfg(test)]
  pub fn is_in_flight(&self, key: &K) -> bool {
    self.registry().contains_key(key)
  }
}

impl<K, V, E> Default for RequestCoalescer<K, V, E>
where
  K: Eq + Hash + Clone + Display + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
  E: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  type Coalescer = RequestCoalescer<String, u32, String>;

  fn counting_fetch(
    calls: &Arc<AtomicUsize>,
    result: Result<u32, String>,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, String>> {
    let calls = Arc::clone(calls);
    move || {
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        result
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_concurrent_callers_share_one_fetch() {
    let coalescer = Coalescer::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b, c) = tokio::join!(
      coalescer.get_or_fetch("abc".into(), counting_fetch(&calls, Ok(7))),
      coalescer.get_or_fetch("abc".into(), counting_fetch(&calls, Ok(8))),
      coalescer.get_or_fetch("abc".into(), counting_fetch(&calls, Ok(9))),
    );

    assert_eq!((a, b, c), (Ok(7), Ok(7), Ok(7)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coalescer.in_flight_count(), 0);
  }

  #[tokio::test]
  async fn test_distinct_keys_fetch_independently() {
    let coalescer = Coalescer::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
      coalescer.get_or_fetch("a".into(), counting_fetch(&calls, Ok(1))),
      coalescer.get_or_fetch("b".into(), counting_fetch(&calls, Ok(2))),
    );

    assert_eq!((a, b), (Ok(1), Ok(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_failure_is_shared_then_retried() {
    let coalescer = Coalescer::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
      coalescer.get_or_fetch("abc".into(), counting_fetch(&calls, Err("offline".into()))),
      coalescer.get_or_fetch("abc".into(), counting_fetch(&calls, Ok(1))),
    );
    assert_eq!(a, Err("offline".to_string()));
    assert_eq!(b, Err("offline".to_string()));
    assert!(!coalescer.is_in_flight(&"abc".to_string()));

    let retry = coalescer
      .get_or_fetch("abc".into(), counting_fetch(&calls, Ok(5)))
      .await;
    assert_eq!(retry, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_entry_visible_while_pending() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let task = {
      let coalescer = Arc::clone(&coalescer);
      let fetch = counting_fetch(&calls, Ok(3));
      tokio::spawn(async move { coalescer.get_or_fetch("slow".into(), fetch).await })
    };

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(coalescer.is_in_flight(&"slow".to_string()));

    assert_eq!(task.await.unwrap(), Ok(3));
    assert_eq!(coalescer.in_flight_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_forget_starts_a_fresh_fetch() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let spawn_fetch = |value: u32| {
      let coalescer = Arc::clone(&coalescer);
      let fetch = counting_fetch(&calls, Ok(value));
      tokio::spawn(async move { coalescer.get_or_fetch("abc".into(), fetch).await })
    };

    let stale = spawn_fetch(1);
    tokio::time::sleep(Duration::from_millis(5)).await;

    coalescer.forget(&"abc".to_string());
    assert!(!coalescer.is_in_flight(&"abc".to_string()));

    let fresh = spawn_fetch(2);
    tokio::time::sleep(Duration::from_millis(5)).await;

    // The detached completion leaves the newer entry alone
    assert_eq!(stale.await.unwrap(), Ok(1));
    assert!(coalescer.is_in_flight(&"abc".to_string()));

    assert_eq!(fresh.await.unwrap(), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coalescer.in_flight_count(), 0);
  }
}
