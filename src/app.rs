use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::client::TrackerApi;
use crate::api::gateway::EntityGateway;
use crate::api::tracker::TrackerClient;
use crate::cache::{EntityStateCache, KvStore, MemoryKvStore, SqliteKvStore};
use crate::clock::{self, SharedClock};
use crate::config::Config;
use crate::event::ControlHandler;
use crate::notify::{
  AppState, CommandDelivery, DedupeStore, NetworkClass, NotificationPoller, NotificationSettings,
  PushDelivery, StdoutDelivery, TickReport, UnseenBadge,
};

/// Process-wide services, constructed once and shared by reference.
pub struct App {
  config: Config,
  storage: Arc<dyn KvStore>,
  gateway: Arc<dyn EntityGateway>,
  dedupe: Arc<DedupeStore>,
  delivery: Arc<dyn PushDelivery>,
  badge: UnseenBadge,
  tracker: TrackerClient,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let gateway: Arc<dyn EntityGateway> = Arc::new(TrackerApi::new(&config)?);

    let storage: Arc<dyn KvStore> = match SqliteKvStore::open() {
      Ok(storage) => Arc::new(storage),
      Err(e) => {
        warn!(error = %e, "State database unavailable, nothing will persist");
        Arc::new(MemoryKvStore::new())
      }
    };

    let delivery: Arc<dyn PushDelivery> = match &config.notifier.command {
      Some(program) => Arc::new(CommandDelivery::new(program.clone())),
      None => Arc::new(StdoutDelivery),
    };

    Ok(Self::with_parts(config, gateway, storage, delivery, clock::system()))
  }

  /// Wire the services around explicit collaborators.
  pub fn with_parts(
    config: Config,
    gateway: Arc<dyn EntityGateway>,
    storage: Arc<dyn KvStore>,
    delivery: Arc<dyn PushDelivery>,
    clock: SharedClock,
  ) -> Self {
    let dedupe = Arc::new(DedupeStore::load(Arc::clone(&storage), clock, &config.dedupe));
    let badge = UnseenBadge::new();
    let cache = Arc::new(EntityStateCache::new(Arc::clone(&gateway)));
    let tracker = TrackerClient::new(Arc::clone(&gateway), cache, badge.clone());

    Self {
      config,
      storage,
      gateway,
      dedupe,
      delivery,
      badge,
      tracker,
    }
  }

  pub fn tracker(&self) -> &TrackerClient {
    &self.tracker
  }

  pub fn settings(&self) -> NotificationSettings {
    NotificationSettings::load(self.storage.as_ref())
  }

  pub fn save_settings(&self, settings: &NotificationSettings) -> Result<()> {
    settings.save(self.storage.as_ref())
  }

  fn poller(&self) -> NotificationPoller {
    NotificationPoller::new(
      Arc::clone(&self.gateway),
      Arc::clone(&self.dedupe),
      Arc::clone(&self.delivery),
      Arc::clone(&self.storage),
      self.config.poller.clone(),
      self.badge.clone(),
    )
  }

  async fn ensure_permission(&self) -> bool {
    if self.delivery.check_permission().await {
      return true;
    }
    self.delivery.request_permission().await
  }

  /// Poll once, outside any schedule.
  pub async fn check_now(&self) -> Result<TickReport> {
    if !self.ensure_permission().await {
      return Err(eyre!("Notification delivery is not available"));
    }
    let poller = self.poller();
    let dispatcher = poller.dispatcher();
    poller
      .check_once(&dispatcher)
      .await
      .map_err(|e| eyre!("Failed to check notifications: {}", e))
  }

  /// Run the poller until ctrl-c or a quit command on stdin.
  pub async fn run_poller(&self, app: AppState, network: NetworkClass) -> Result<()> {
    if !self.ensure_permission().await {
      warn!("Notification delivery unavailable, polling anyway");
    }

    let handle = self.poller().spawn(app, network);
    let control = ControlHandler::stdin(handle.sender());
    // Deliver whatever is waiting right away
    handle.check_now();

    tokio::select! {
      result = tokio::signal::ctrl_c() => {
        if let Err(e) = result {
          warn!(error = %e, "Failed to listen for ctrl-c");
        }
        info!("Interrupted, stopping poller");
      }
      _ = handle.stopped() => {}
    }

    control.stop();
    handle.shutdown().await;
    Ok(())
  }

  /// Drop session state and wait for pending dedupe writes.
  pub async fn shutdown(&self) {
    self.tracker.cache().clear_all();
    self.dedupe.flush().await;
    info!(dedupe_records = self.dedupe.len(), "Shut down");
  }
}
