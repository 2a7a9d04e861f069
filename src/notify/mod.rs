//! Notification polling, deduplication and delivery.
//!
//! This module provides:
//! - A poller whose cadence follows app visibility and network class
//! - A persistent dedupe store so a server-resent event is shown once
//! - A dispatcher that applies per-category preferences and formats payloads

mod badge;
mod dedupe;
mod delivery;
mod dispatcher;
mod format;
mod poller;
mod settings;

pub use badge::UnseenBadge;
pub use dedupe::DedupeStore;
pub use delivery::{CommandDelivery, PushDelivery, StdoutDelivery};
pub use format::render;
pub use poller::{AppState, NetworkClass, NotificationPoller, Signal, TickReport};
pub use settings::NotificationSettings;

#[cfg(test)]
pub use delivery::testing as delivery_testing;
