//! Boundary to the remote tracker API.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{FavouriteKind, NotificationPage, WatchRecord};

/// Errors returned by the remote gateway.
///
/// Cloneable so one coalesced outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
  #[error("resource not found")]
  NotFound,

  #[error("not authorized, check the auth token")]
  Unauthorized,

  #[error("server responded with {code}: {body}")]
  Status { code: u16, body: String },

  #[error("network error: {0}")]
  Transport(String),

  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl GatewayError {
  /// Whether retrying later could succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      GatewayError::Transport(_) => true,
      GatewayError::Status { code, .. } => *code >= 500 || *code == 429,
      _ => false,
    }
  }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Remote API for per-entity watch/favourite state and notifications.
#[async_trait]
pub trait EntityGateway: Send + Sync {
  /// `Ok(None)` when the server has no record for the entity.
  async fn get_watch(&self, key: &str) -> GatewayResult<Option<WatchRecord>>;

  async fn put_watch(&self, key: &str, record: &WatchRecord) -> GatewayResult<()>;

  async fn delete_watch(&self, key: &str) -> GatewayResult<()>;

  async fn get_favourite(&self, kind: FavouriteKind, key: &str) -> GatewayResult<bool>;

  async fn set_favourite(&self, kind: FavouriteKind, key: &str, favourite: bool)
    -> GatewayResult<()>;

  async fn list_notifications(&self, page: u32, size: u32) -> GatewayResult<NotificationPage>;

  async fn unseen_count(&self) -> GatewayResult<u32>;

  async fn mark_seen(&self, reference: &str) -> GatewayResult<()>;

  async fn mark_all_seen(&self) -> GatewayResult<()>;
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use crate::api::types::NotificationItem;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  /// Scriptable in-memory gateway that counts calls.
  #[derive(Default)]
  pub struct StubGateway {
    pub watch: Mutex<HashMap<String, WatchRecord>>,
    pub favourites: Mutex<HashMap<(FavouriteKind, String), bool>>,
    pub notifications: Mutex<Vec<NotificationItem>>,
    pub unseen: Mutex<u32>,
    pub delay: Mutex<Duration>,
    pub fail: AtomicBool,
    pub get_watch_calls: AtomicUsize,
    pub get_favourite_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub seen_calls: AtomicUsize,
  }

  impl StubGateway {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
      *self.delay.lock().unwrap() = delay;
      self
    }

    pub fn set_failing(&self, fail: bool) {
      self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_notifications(&self, items: Vec<NotificationItem>) {
      *self.notifications.lock().unwrap() = items;
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
      counter.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> GatewayResult<()> {
      let delay = *self.delay.lock().unwrap();
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      if self.fail.load(Ordering::SeqCst) {
        return Err(GatewayError::Transport("connection reset".into()));
      }
      Ok(())
    }
  }

  #[async_trait]
  impl EntityGateway for StubGateway {
    async fn get_watch(&self, key: &str) -> GatewayResult<Option<WatchRecord>> {
      self.get_watch_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      Ok(self.watch.lock().unwrap().get(key).cloned())
    }

    async fn put_watch(&self, key: &str, record: &WatchRecord) -> GatewayResult<()> {
      self.write_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      self
        .watch
        .lock()
        .unwrap()
        .insert(key.to_string(), record.clone());
      Ok(())
    }

    async fn delete_watch(&self, key: &str) -> GatewayResult<()> {
      self.write_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      self.watch.lock().unwrap().remove(key);
      Ok(())
    }

    async fn get_favourite(&self, kind: FavouriteKind, key: &str) -> GatewayResult<bool> {
      self.get_favourite_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      Ok(
        self
          .favourites
          .lock()
          .unwrap()
          .get(&(kind, key.to_string()))
          .copied()
          .unwrap_or(false),
      )
    }

    async fn set_favourite(
      &self,
      kind: FavouriteKind,
      key: &str,
      favourite: bool,
    ) -> GatewayResult<()> {
      self.write_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      self
        .favourites
        .lock()
        .unwrap()
        .insert((kind, key.to_string()), favourite);
      Ok(())
    }

    async fn list_notifications(&self, page: u32, size: u32) -> GatewayResult<NotificationPage> {
      self.list_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      let all = self.notifications.lock().unwrap().clone();
      let size = size.max(1) as usize;
      let pages = all.len().div_ceil(size) as u32;
      let items = all
        .into_iter()
        .skip((page.saturating_sub(1) as usize) * size)
        .take(size)
        .collect();
      Ok(NotificationPage { items, pages })
    }

    async fn unseen_count(&self) -> GatewayResult<u32> {
      self.respond().await?;
      Ok(*self.unseen.lock().unwrap())
    }

    async fn mark_seen(&self, _reference: &str) -> GatewayResult<()> {
      self.seen_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      let mut unseen = self.unseen.lock().unwrap();
      *unseen = unseen.saturating_sub(1);
      Ok(())
    }

    async fn mark_all_seen(&self) -> GatewayResult<()> {
      self.seen_calls.fetch_add(1, Ordering::SeqCst);
      self.respond().await?;
      *self.unseen.lock().unwrap() = 0;
      Ok(())
    }
  }
}
