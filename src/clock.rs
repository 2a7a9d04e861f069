//! Wall-clock abstraction so time-window logic can be driven from tests.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system() -> SharedClock {
  Arc::new(SystemClock)
}
