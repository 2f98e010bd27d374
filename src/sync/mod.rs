//! Offline-first favorites synchronization.
//!
//! Local writes are applied synchronously and returned immediately. A
//! background task pushes the resulting snapshot; if it fails (or the
//! network is known to be down) the snapshot goes into the single-slot
//! queue, which is drained on the next reconnect or startup trigger.

pub mod monitor;
pub mod queue;
pub mod reconciler;
pub mod remote;
pub mod session;

use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::favorites::{FavoriteSet, FavoritesStore};
use crate::tasks::Background;

pub use monitor::{HttpProbe, NetworkMonitor, NetworkStatus};
pub use queue::SyncQueue;
pub use reconciler::Reconciler;
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore, UnconfiguredRemote};
pub use session::{Session, UserProfile};

/// Indicator of whether local favorites are confirmed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
  Synced,
  Pending,
  Syncing,
}

/// Result of a drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Nothing was queued
  Empty,
  /// A snapshot is queued but nobody is signed in
  NotSignedIn,
  /// Snapshot pushed and queue cleared
  Drained,
  /// Push failed; snapshot stays queued for the next trigger
  Retained(RemoteError),
}

#[derive(Clone)]
pub struct SyncEngine {
  store: FavoritesStore,
  queue: SyncQueue,
  reconciler: Reconciler,
  session: Session,
  monitor: Arc<NetworkMonitor>,
  status: Arc<watch::Sender<SyncStatus>>,
  pushes: Background,
}

impl SyncEngine {
  pub fn new(
    store: FavoritesStore,
    queue: SyncQueue,
    reconciler: Reconciler,
    session: Session,
    monitor: Arc<NetworkMonitor>,
  ) -> Self {
    let initial = if queue.has_pending() {
      SyncStatus::Pending
    } else {
      SyncStatus::Synced
    };
    let (status, _) = watch::channel(initial);

    Self {
      store,
      queue,
      reconciler,
      session,
      monitor,
      status: Arc::new(status),
      pushes: Background::new(),
    }
  }

  pub fn store(&self) -> &FavoritesStore {
    &self.store
  }

  pub fn queue(&self) -> &SyncQueue {
    &self.queue
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn status(&self) -> SyncStatus {
    *self.status.borrow()
  }

  pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
    self.status.subscribe()
  }

  /// Toggle locally, then propagate in the background.
  pub fn toggle_favorite(&self, id: &str) -> bool {
    let (member, snapshot) = self.store.toggle_favorite(id);
    self.propagate(snapshot);
    member
  }

  /// Union-import locally; propagates only if something was added.
  pub fn import_favorites<I, S>(&self, ids: I) -> usize
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let (added, snapshot) = self.store.import_favorites_snapshot(ids);
    if added > 0 {
      self.propagate(snapshot);
    }
    added
  }

  pub fn clear_favorites(&self) {
    self.store.clear_favorites();
    self.propagate(FavoriteSet::new());
  }

  /// Queue `snapshot` and push it without making the caller wait.
  ///
  /// Known-offline skips the push; a failed push leaves it queued.
  fn propagate(&self, snapshot: FavoriteSet) {
    let Some(user) = self.session.current_user() else {
      debug!("Not signed in, favorites stay local until login");
      return;
    };

    // The snapshot stays queued until a push confirms it
    let mutation = self.queue.enqueue(snapshot);
    if self.monitor.is_offline() {
      self.set_status(SyncStatus::Pending);
      return;
    }

    let this = self.clone();
    self.set_status(SyncStatus::Syncing);
    self.pushes.spawn(async move {
      match this.reconciler.push(&user, &mutation.payload).await {
        Ok(()) => {
          let empty = this.queue.clear_if(&mutation);
          this.set_status(if empty {
            SyncStatus::Synced
          } else {
            SyncStatus::Pending
          });
        }
        Err(e) => {
          warn!("Push failed, snapshot stays queued: {}", e);
          this.set_status(SyncStatus::Pending);
        }
      }
    });
  }

  /// Push the queued snapshot if there is one. Never fatal.
  pub async fn drain_if_possible(&self) -> DrainOutcome {
    let Some(pending) = self.queue.pending() else {
      return DrainOutcome::Empty;
    };
    let Some(user) = self.session.current_user() else {
      return DrainOutcome::NotSignedIn;
    };

    self.set_status(SyncStatus::Syncing);
    match self.reconciler.push(&user, &pending.payload).await {
      Ok(()) => {
        let empty = self.queue.clear_if(&pending);
        self.set_status(if empty {
          SyncStatus::Synced
        } else {
          SyncStatus::Pending
        });
        info!("Drained pending favorites");
        DrainOutcome::Drained
      }
      Err(e) => {
        warn!("Drain failed, keeping queued snapshot: {}", e);
        self.set_status(SyncStatus::Pending);
        DrainOutcome::Retained(e)
      }
    }
  }

  /// Authentication event: sign in and union-merge with the remote once.
  ///
  /// On success the union supersedes the snapshot queued before login.
  pub async fn login(&self, user: UserProfile) -> Result<FavoriteSet, RemoteError> {
    self.session.sign_in(user.clone());
    let local = self.store.get_favorites();
    let queued = self.queue.pending();

    self.set_status(SyncStatus::Syncing);
    match self.reconciler.reconcile_on_login(&user, &local).await {
      Ok(merged) => {
        // Snapshots queued while reconciling are newer than the union
        let empty = match &queued {
          Some(queued) => self.queue.clear_if(queued),
          None => !self.queue.has_pending(),
        };
        self.set_status(if empty {
          SyncStatus::Synced
        } else {
          SyncStatus::Pending
        });
        Ok(merged)
      }
      Err(e) => {
        self.set_status(if self.queue.has_pending() {
          SyncStatus::Pending
        } else {
          SyncStatus::Synced
        });
        Err(e)
      }
    }
  }

  /// Drain on every monitor trigger; runs until aborted.
  pub fn spawn_worker(&self) -> JoinHandle<()> {
    let this = self.clone();
    let mut triggers = self.monitor.subscribe_triggers();
    tokio::spawn(async move {
      loop {
        match triggers.recv().await {
          Ok(trigger) => {
            debug!(?trigger, "Draining on trigger");
            this.drain_if_possible().await;
          }
          Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "Coalesced drain triggers");
            this.drain_if_possible().await;
          }
          Err(RecvError::Closed) => break,
        }
      }
    })
  }

  /// Wait for in-flight background pushes.
  pub async fn settle(&self) {
    self.pushes.settle().await;
  }

  fn set_status(&self, status: SyncStatus) {
    self.status.send_replace(status);
  }
}
