use std::sync::Arc;
use tokio::sync::watch;

/// Locally tracked count of unseen notifications, shared between the poller
/// (which refreshes it from the server) and anything that marks items seen.
#[derive(Clone)]
pub struct UnseenBadge {
  tx: Arc<watch::Sender<u32>>,
}

impl UnseenBadge {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(0);
    Self { tx: Arc::new(tx) }
  }

  pub fn get(&self) -> u32 {
    *self.tx.borrow()
  }

  pub fn set(&self, unseen: u32) {
    self.tx.send_if_modified(|current| {
      let changed = *current != unseen;
      *current = unseen;
      changed
    });
  }

  pub fn decrement(&self) {
    self.tx.send_if_modified(|current| {
      if *current == 0 {
        return false;
      }
      *current -= 1;
      true
    });
  }

  pub fn clear(&self) {
    self.set(0);
  }

  pub fn subscribe(&self) -> watch::Receiver<u32> {
    self.tx.subscribe()
  }
}

impl Default for UnseenBadge {
  fn default() -> Self {
    Self::new()
  }
}
