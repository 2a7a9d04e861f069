//! Adaptive notification polling loop.
//!
//! The polling interval follows two external signals: whether the app is in
//! the foreground and what kind of network it is on. Whenever a signal (or
//! the notification settings) changes, the timer is rebuilt from scratch so
//! a stale cadence can never keep firing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, Sleep};
use tracing::{debug, info, warn};

use super::badge::UnseenBadge;
use super::dedupe::DedupeStore;
use super::delivery::PushDelivery;
use super::dispatcher::{DispatchReport, NotificationDispatcher};
use super::settings::NotificationSettings;
use crate::api::gateway::{EntityGateway, GatewayResult};
use crate::cache::KvStore;
use crate::config::PollerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
  Foreground,
  Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
  /// Wi-Fi, ethernet
  Unmetered,
  /// Cellular or otherwise constrained
  Metered,
  Unknown,
}

/// Polling interval tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
  Fast,
  Constrained,
  Background,
}

impl Regime {
  pub fn select(app: AppState, network: NetworkClass) -> Self {
    match (app, network) {
      (AppState::Background, _) => Regime::Background,
      (AppState::Foreground, NetworkClass::Unmetered) => Regime::Fast,
      (AppState::Foreground, NetworkClass::Metered | NetworkClass::Unknown) => {
        Regime::Constrained
      }
    }
  }

  pub fn interval(&self, config: &PollerConfig) -> Duration {
    match self {
      Regime::Fast => config.fast_interval(),
      Regime::Constrained => config.constrained_interval(),
      Regime::Background => config.background_interval(),
    }
  }
}

/// Inputs that drive the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
  App(AppState),
  Network(NetworkClass),
  SettingsChanged,
  CheckNow,
  Shutdown,
}

/// Result of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
  pub fetched: usize,
  pub candidates: usize,
  pub dispatch: DispatchReport,
  /// The poller was torn down while the fetch was in flight
  pub discarded: bool,
}

/// Fetches the feed and routes new items to the dispatcher.
pub struct NotificationPoller {
  gateway: Arc<dyn EntityGateway>,
  dedupe: Arc<DedupeStore>,
  delivery: Arc<dyn PushDelivery>,
  storage: Arc<dyn KvStore>,
  config: PollerConfig,
  badge: UnseenBadge,
  alive: Arc<AtomicBool>,
}

impl NotificationPoller {
  pub fn new(
    gateway: Arc<dyn EntityGateway>,
    dedupe: Arc<DedupeStore>,
    delivery: Arc<dyn PushDelivery>,
    storage: Arc<dyn KvStore>,
    config: PollerConfig,
    badge: UnseenBadge,
  ) -> Self {
    Self {
      gateway,
      dedupe,
      delivery,
      storage,
      config,
      badge,
      alive: Arc::new(AtomicBool::new(true)),
    }
  }

  /// A dispatcher bound to the currently stored preferences.
  pub fn dispatcher(&self) -> NotificationDispatcher {
    NotificationDispatcher::new(
      Arc::clone(&self.dedupe),
      Arc::clone(&self.delivery),
      NotificationSettings::load(self.storage.as_ref()),
    )
  }

  /// Poll once: first page, unseen only, not yet delivered, capped per tick.
  pub async fn check_once(
    &self,
    dispatcher: &NotificationDispatcher,
  ) -> GatewayResult<TickReport> {
    let page = self
      .gateway
      .list_notifications(1, self.config.page_size)
      .await?;

    if !self.alive.load(Ordering::SeqCst) {
      debug!("Poller torn down during fetch, discarding results");
      return Ok(TickReport {
        fetched: page.items.len(),
        discarded: true,
        ..TickReport::default()
      });
    }

    let fetched = page.items.len();
    let candidates: Vec<_> = page
      .items
      .into_iter()
      .filter(|item| !item.seen)
      .filter(|item| self.dedupe.should_deliver(item))
      .take(self.config.batch_size)
      .collect();

    let dispatch = dispatcher.dispatch(&candidates).await;

    match self.gateway.unseen_count().await {
      Ok(unseen) => self.badge.set(unseen),
      Err(e) => debug!(error = %e, "Failed to refresh unseen count"),
    }

    Ok(TickReport {
      fetched,
      candidates: candidates.len(),
      dispatch,
      discarded: false,
    })
  }

  /// Run the loop on a background task.
  pub fn spawn(self, app: AppState, network: NetworkClass) -> PollerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let alive = Arc::clone(&self.alive);
    let task = tokio::spawn(self.run(rx, app, network));
    PollerHandle { tx, alive, task }
  }

  fn arm(&self, regime: Regime) -> std::pin::Pin<Box<Sleep>> {
    let interval = regime.interval(&self.config);
    debug!(?regime, interval_secs = interval.as_secs(), "Armed poll timer");
    Box::pin(sleep_until(Instant::now() + interval))
  }

  async fn tick(&self, dispatcher: &NotificationDispatcher) {
    match self.check_once(dispatcher).await {
      Ok(report) if report.dispatch.delivered > 0 || report.dispatch.failed > 0 => {
        info!(?report, "Notification poll finished");
      }
      Ok(report) => debug!(?report, "Notification poll finished"),
      // A failed poll never stops the loop
      Err(e) => warn!(error = %e, "Notification poll failed"),
    }
  }

  async fn run(self, mut rx: mpsc::UnboundedReceiver<Signal>, app: AppState, network: NetworkClass) {
    let mut app = app;
    let mut network = network;
    let mut regime = Regime::select(app, network);
    let mut dispatcher = self.dispatcher();
    let mut timer = self.arm(regime);

    info!(?regime, "Notification poller started");

    loop {
      tokio::select! {
        _ = timer.as_mut() => {
          self.tick(&dispatcher).await;
          timer = self.arm(regime);
        }
        signal = rx.recv() => {
          let Some(signal) = signal else { break };
          match signal {
            Signal::App(next) => {
              if next != app {
                app = next;
                regime = Regime::select(app, network);
                timer = self.arm(regime);
              }
            }
            Signal::Network(next) => {
              if next != network {
                network = next;
                regime = Regime::select(app, network);
                timer = self.arm(regime);
              }
            }
            Signal::SettingsChanged => {
              dispatcher = self.dispatcher();
              timer = self.arm(regime);
            }
            Signal::CheckNow => self.tick(&dispatcher).await,
            Signal::Shutdown => break,
          }
        }
      }

      if !self.alive.load(Ordering::SeqCst) {
        break;
      }
    }

    info!("Notification poller stopped");
  }
}

/// Control surface for a running poller.
pub struct PollerHandle {
  tx: mpsc::UnboundedSender<Signal>,
  alive: Arc<AtomicBool>,
  task: JoinHandle<()>,
}

impl PollerHandle {
  /// Sender for feeding signals from other tasks.
  pub fn sender(&self) -> mpsc::UnboundedSender<Signal> {
    self.tx.clone()
  }

  pub fn send(&self, signal: Signal) {
    // Only fails once the loop has exited
    let _ = self.tx.send(signal);
  }

  #[cfg(test)]
  pub fn set_app_state(&self, app: AppState) {
    self.send(Signal::App(app));
  }

  #[cfg(test)]
  pub fn set_network(&self, network: NetworkClass) {
    self.send(Signal::Network(network));
  }

  pub fn check_now(&self) {
    self.send(Signal::CheckNow);
  }

  #[cfg(test)]
  pub fn settings_changed(&self) {
    self.send(Signal::SettingsChanged);
  }

  /// Resolves once the loop has exited, e.g. after a quit signal.
  pub async fn stopped(&self) {
    self.tx.closed().await;
  }

  /// Stop the loop. A fetch in flight is allowed to finish but its results
  /// are discarded.
  pub async fn shutdown(self) {
    self.alive.store(false, Ordering::SeqCst);
    self.send(Signal::Shutdown);
    if let Err(e) = self.task.await {
      warn!(error = %e, "Notification poller task failed");
    }
  }
}
