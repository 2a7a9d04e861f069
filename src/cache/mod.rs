//! Client-side entity state caching.
//!
//! This module provides:
//! - A request coalescer so concurrent reads of one entity share a fetch
//! - An in-process cache of watch and favourite state with optimistic writes
//! - A persistent key-value store for state that must survive restarts

mod coalescer;
mod entity;
mod storage;
mod traits;

pub use entity::EntityStateCache;
pub use storage::{KvStore, MemoryKvStore, SqliteKvStore};

#[cfg(test)]
pub use storage::testing;
#[cfg(test)]
pub use traits::Lookup;
