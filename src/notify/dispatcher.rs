//! Preference filtering, formatting, and hand-off to push delivery.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dedupe::DedupeStore;
use super::delivery::PushDelivery;
use super::format;
use super::settings::NotificationSettings;
use crate::api::types::NotificationItem;

/// Outcome of one dispatch batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
  pub delivered: usize,
  /// Dropped because the category is disabled
  pub disabled: usize,
  /// Already delivered within the dedupe window
  pub duplicates: usize,
  /// Delivery failed; left eligible for the next poll
  pub failed: usize,
  pub permission_denied: bool,
}

/// Routes candidate notifications to the user.
///
/// Holds a snapshot of the preferences it was built with; rebuild it when
/// preferences change.
pub struct NotificationDispatcher {
  dedupe: Arc<DedupeStore>,
  delivery: Arc<dyn PushDelivery>,
  settings: NotificationSettings,
}

impl NotificationDispatcher {
  pub fn new(
    dedupe: Arc<DedupeStore>,
    delivery: Arc<dyn PushDelivery>,
    settings: NotificationSettings,
  ) -> Self {
    Self {
      dedupe,
      delivery,
      settings,
    }
  }

  pub async fn dispatch(&self, items: &[NotificationItem]) -> DispatchReport {
    let mut report = DispatchReport::default();
    if items.is_empty() {
      return report;
    }

    if !self.delivery.check_permission().await {
      warn!(pending = items.len(), "Notification permission not granted");
      report.permission_denied = true;
      return report;
    }

    for item in items {
      if !self.settings.is_enabled(&item.category) {
        // Not recorded, so re-enabling the category makes it deliverable
        debug!(category = %item.category, "Category disabled, skipping");
        report.disabled += 1;
        continue;
      }

      // Re-checked here so two items with one identity in a batch send once
      if !self.dedupe.should_deliver(item) {
        report.duplicates += 1;
        continue;
      }

      let message = format::render(item);
      if self.delivery.send(&message).await {
        self.dedupe.mark_delivered(item);
        report.delivered += 1;
      } else {
        warn!(category = %item.category, "Delivery failed, will retry next poll");
        report.failed += 1;
      }
    }

    if report.delivered > 0 {
      info!(
        delivered = report.delivered,
        failed = report.failed,
        "Delivered notifications"
      );
    }
    report
  }
}
