//! Core types shared by the coalescer and the entity cache.

use std::fmt;

use crate::api::types::{EntityKey, FavouriteKind};

/// Result of a synchronous cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
  /// Never fetched (or invalidated) this session
  Unresolved,
  /// Last value known to the client
  Resolved(T),
}

impl<T> Lookup<T> {
  #[cfg(test)]
  pub fn is_resolved(&self) -> bool {
    matches!(self, Lookup::Resolved(_))
  }
}

/// Kind of remote read, scoping in-flight requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  Watch,
  Favourite(FavouriteKind),
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operation::Watch => f.write_str("watch"),
      Operation::Favourite(kind) => write!(f, "favourite:{}", kind),
    }
  }
}

/// Identifies one cached record: (operation kind, entity key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub operation: Operation,
  pub key: EntityKey,
}

impl RequestKey {
  pub fn watch(key: impl Into<EntityKey>) -> Self {
    Self {
      operation: Operation::Watch,
      key: key.into(),
    }
  }

  pub fn favourite(kind: FavouriteKind, key: impl Into<EntityKey>) -> Self {
    Self {
      operation: Operation::Favourite(kind),
      key: key.into(),
    }
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.operation, self.key)
  }
}

/// Change notification published by the entity cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// A record was stored (fetched or written)
  Updated(RequestKey),
  /// A record was dropped
  Invalidated(RequestKey),
  /// Everything was dropped
  Cleared,
}
