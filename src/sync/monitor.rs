//! Network state monitor: connectivity transitions and startup triggers.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
  Online,
  Offline,
  Unknown,
}

/// Events that should cause the pending queue to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// Application started and the settle delay elapsed
  Startup,
  /// Connectivity came back after being offline
  Reconnected,
}

/// Tracks connectivity and publishes drain triggers to subscribers.
pub struct NetworkMonitor {
  status: watch::Sender<NetworkStatus>,
  triggers: broadcast::Sender<Trigger>,
}

impl NetworkMonitor {
  pub fn new(initial: NetworkStatus) -> Self {
    let (status, _) = watch::channel(initial);
    let (triggers, _) = broadcast::channel(16);
    Self { status, triggers }
  }

  pub fn current_status(&self) -> NetworkStatus {
    *self.status.borrow()
  }

  /// Only a confirmed offline state counts; unknown connectivity is tried.
  pub fn is_offline(&self) -> bool {
    self.current_status() == NetworkStatus::Offline
  }

  /// Record the latest observed connectivity.
  ///
  /// An offline -> online transition emits `Trigger::Reconnected`.
  pub fn report(&self, status: NetworkStatus) {
    let mut previous = status;
    let changed = self.status.send_if_modified(|current| {
      previous = *current;
      if *current == status {
        return false;
      }
      *current = status;
      true
    });

    if !changed {
      return;
    }

    match status {
      NetworkStatus::Online => info!("Network: online"),
      NetworkStatus::Offline => warn!("Network: offline"),
      NetworkStatus::Unknown => debug!("Network: unknown"),
    }

    if previous == NetworkStatus::Offline && status == NetworkStatus::Online {
      self.fire(Trigger::Reconnected);
    }
  }

  pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
    self.status.subscribe()
  }

  pub fn subscribe_triggers(&self) -> broadcast::Receiver<Trigger> {
    self.triggers.subscribe()
  }

  /// Emit `Trigger::Startup` once `settle` has elapsed.
  pub fn announce_startup(self: &Arc<Self>, settle: Duration) -> JoinHandle<()> {
    let monitor = Arc::clone(self);
    tokio::spawn(async move {
      tokio::time::sleep(settle).await;
      monitor.fire(Trigger::Startup);
    })
  }

  /// Poll `probe` every `interval` and report what it sees.
  pub fn spawn_probe(
    self: &Arc<Self>,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
  ) -> JoinHandle<()> {
    let monitor = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let status = if probe.is_reachable().await {
          NetworkStatus::Online
        } else {
          NetworkStatus::Offline
        };
        monitor.report(status);
      }
    })
  }

  fn fire(&self, trigger: Trigger) {
    debug!(?trigger, "Drain trigger");
    // No subscribers just means nobody is draining yet
    let _ = self.triggers.send(trigger);
  }
}

/// Environment connectivity check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  async fn is_reachable(&self) -> bool;
}

/// Treats any HTTP response from `url` as connectivity.
pub struct HttpProbe {
  client: Client,
  url: Url,
}

impl HttpProbe {
  pub fn new(url: Url) -> Self {
    Self {
      client: Client::new(),
      url,
    }
  }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
  async fn is_reachable(&self) -> bool {
    match self.client.head(self.url.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!("Probe {} failed: {}", self.url, e);
        false
      }
    }
  }
}
