//! Local push-delivery backends.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

use super::format::PushMessage;

/// Hands a rendered notification to the user.
#[async_trait]
pub trait PushDelivery: Send + Sync {
  /// Returns whether the notification was shown.
  async fn send(&self, message: &PushMessage) -> bool;

  async fn check_permission(&self) -> bool;

  async fn request_permission(&self) -> bool;
}

/// Prints notifications to stdout.
pub struct StdoutDelivery;

#[async_trait]
impl PushDelivery for StdoutDelivery {
  async fn send(&self, message: &PushMessage) -> bool {
    if message.body.is_empty() {
      println!("🔔 {}", message.title);
    } else {
      println!("🔔 {}: {}", message.title, message.body);
    }
    true
  }

  async fn check_permission(&self) -> bool {
    true
  }

  async fn request_permission(&self) -> bool {
    true
  }
}

/// Shows notifications through an external command such as `notify-send`,
/// invoked as `<program> [--icon <image>] <title> <body>`.
pub struct CommandDelivery {
  program: String,
}

impl CommandDelivery {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }

  /// Whether the program can be found, either as a path or on `$PATH`.
  fn program_available(&self) -> bool {
    let program = Path::new(&self.program);
    if program.components().count() > 1 {
      return program.is_file();
    }
    std::env::var_os("PATH")
      .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file()))
      .unwrap_or(false)
  }
}

#[async_trait]
impl PushDelivery for CommandDelivery {
  async fn send(&self, message: &PushMessage) -> bool {
    let mut command = Command::new(&self.program);
    if let Some(image) = &message.image {
      command.arg("--icon").arg(image);
    }
    command.arg(&message.title).arg(&message.body);

    match command.status().await {
      Ok(status) if status.success() => {
        debug!(program = %self.program, "Notification shown");
        true
      }
      Ok(status) => {
        warn!(program = %self.program, %status, "Notification command failed");
        false
      }
      Err(e) => {
        warn!(program = %self.program, error = %e, "Failed to run notification command");
        false
      }
    }
  }

  async fn check_permission(&self) -> bool {
    self.program_available()
  }

  async fn request_permission(&self) -> bool {
    // Desktop notifications have no consent prompt; availability is the permission
    let available = self.program_available();
    if !available {
      warn!(program = %self.program, "Notification command not found");
    }
    available
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;

  /// Delivery double that records what it was asked to show.
  pub struct RecordingDelivery {
    pub sent: Mutex<Vec<PushMessage>>,
    pub succeed: AtomicBool,
    pub permitted: AtomicBool,
  }

  impl RecordingDelivery {
    pub fn new() -> Self {
      Self {
        sent: Mutex::new(Vec::new()),
        succeed: AtomicBool::new(true),
        permitted: AtomicBool::new(true),
      }
    }

    pub fn sent_titles(&self) -> Vec<String> {
      self
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.title.clone())
        .collect()
    }

    pub fn sent_count(&self) -> usize {
      self.sent.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl PushDelivery for RecordingDelivery {
    async fn send(&self, message: &PushMessage) -> bool {
      self.sent.lock().unwrap().push(message.clone());
      self.succeed.load(Ordering::SeqCst)
    }

    async fn check_permission(&self) -> bool {
      self.permitted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> bool {
      self.permitted.store(true, Ordering::SeqCst);
      true
    }
  }
}
