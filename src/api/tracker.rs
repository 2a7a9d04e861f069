//! Tracker client that reads through the entity cache and mirrors writes.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::warn;

use crate::cache::EntityStateCache;
use crate::notify::UnseenBadge;

use super::gateway::EntityGateway;
use super::types::{FavouriteKind, NotificationPage, WatchRecord};

/// Tracker API with cached reads and optimistic writes.
///
/// Writes land in the cache first and are then sent to the server. A failed
/// send leaves the local value in place and returns the error; nothing is
/// rolled back or retried.
#[derive(Clone)]
pub struct TrackerClient {
  gateway: Arc<dyn EntityGateway>,
  cache: Arc<EntityStateCache>,
  badge: UnseenBadge,
}

impl TrackerClient {
  pub fn new(
    gateway: Arc<dyn EntityGateway>,
    cache: Arc<EntityStateCache>,
    badge: UnseenBadge,
  ) -> Self {
    Self {
      gateway,
      cache,
      badge,
    }
  }

  pub fn cache(&self) -> &EntityStateCache {
    &self.cache
  }

  /// Watch record for an entity; `None` when the user has none.
  pub async fn watch(&self, key: &str) -> Result<Option<WatchRecord>> {
    self
      .cache
      .resolve_watch(key)
      .await
      .map_err(|e| eyre!("Failed to load watch status for {}: {}", key, e))
  }

  /// Save a watch record (status and progress together).
  pub async fn set_watch(&self, key: &str, record: WatchRecord) -> Result<()> {
    self.cache.write_watch(key, Some(record.clone()));

    self.gateway.put_watch(key, &record).await.map_err(|e| {
      warn!(key, error = %e, "Failed to mirror watch status");
      eyre!("Failed to save watch status for {}: {}", key, e)
    })
  }

  /// Remove the watch record, progress included.
  pub async fn clear_watch(&self, key: &str) -> Result<()> {
    self.cache.write_watch(key, None);

    self.gateway.delete_watch(key).await.map_err(|e| {
      warn!(key, error = %e, "Failed to mirror watch removal");
      eyre!("Failed to remove watch status for {}: {}", key, e)
    })
  }

  pub async fn favourite(&self, kind: FavouriteKind, key: &str) -> Result<bool> {
    self
      .cache
      .resolve_favourite(kind, key)
      .await
      .map_err(|e| eyre!("Failed to load favourite state for {} {}: {}", kind, key, e))
  }

  pub async fn set_favourite(&self, kind: FavouriteKind, key: &str, favourite: bool) -> Result<()> {
    self.cache.write_favourite(kind, key, favourite);

    self
      .gateway
      .set_favourite(kind, key, favourite)
      .await
      .map_err(|e| {
        warn!(key, %kind, error = %e, "Failed to mirror favourite");
        eyre!("Failed to update favourite for {} {}: {}", kind, key, e)
      })
  }

  /// One page of the notification feed (not cached).
  pub async fn notifications(&self, page: u32, size: u32) -> Result<NotificationPage> {
    self
      .gateway
      .list_notifications(page, size)
      .await
      .map_err(|e| eyre!("Failed to load notifications: {}", e))
  }

  /// Refresh the unseen count from the server.
  pub async fn unseen_count(&self) -> Result<u32> {
    let unseen = self
      .gateway
      .unseen_count()
      .await
      .map_err(|e| eyre!("Failed to load unseen count: {}", e))?;
    self.badge.set(unseen);
    Ok(unseen)
  }

  pub async fn mark_seen(&self, reference: &str) -> Result<()> {
    self
      .gateway
      .mark_seen(reference)
      .await
      .map_err(|e| eyre!("Failed to mark notification {} seen: {}", reference, e))?;
    self.badge.decrement();
    Ok(())
  }

  pub async fn mark_all_seen(&self) -> Result<()> {
    self
      .gateway
      .mark_all_seen()
      .await
      .map_err(|e| eyre!("Failed to mark notifications seen: {}", e))?;
    self.badge.clear();
    Ok(())
  }
}
