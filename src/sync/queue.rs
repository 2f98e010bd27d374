//! Pending-mutation queue: at most one full-state snapshot awaiting push.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::LocalRecord;
use crate::favorites::FavoriteSet;

/// Record key holding the pending mutation.
pub const QUEUE_KEY: &str = "sync-queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
  UpdateFavorites,
}

/// Latest favorites snapshot not yet confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
  pub kind: MutationKind,
  pub payload: FavoriteSet,
  /// Unix epoch milliseconds
  pub enqueued_at: i64,
}

/// Durable single-slot queue. Enqueue replaces, never appends.
#[derive(Clone)]
pub struct SyncQueue {
  record: Arc<dyn LocalRecord>,
}

impl SyncQueue {
  pub fn new(record: Arc<dyn LocalRecord>) -> Self {
    Self { record }
  }

  /// Replace any pending mutation with `snapshot`.
  pub fn enqueue(&self, snapshot: FavoriteSet) -> PendingMutation {
    let mutation = PendingMutation {
      kind: MutationKind::UpdateFavorites,
      payload: snapshot,
      enqueued_at: Utc::now().timestamp_millis(),
    };

    match serde_json::to_string(&mutation) {
      Ok(json) => {
        if let Err(e) = self.record.write(QUEUE_KEY, &json) {
          warn!("Failed to persist pending mutation: {}", e);
        }
      }
      Err(e) => warn!("Failed to serialize pending mutation: {}", e),
    }

    debug!(size = mutation.payload.len(), "Queued favorites snapshot");
    mutation
  }

  pub fn pending(&self) -> Option<PendingMutation> {
    let raw = match self.record.read(QUEUE_KEY) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!("Failed to read pending mutation: {}", e);
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(mutation) => Some(mutation),
      Err(e) => {
        warn!("Discarding unreadable pending mutation: {}", e);
        None
      }
    }
  }

  pub fn has_pending(&self) -> bool {
    self.pending().is_some()
  }

  pub fn clear(&self) {
    if let Err(e) = self.record.remove(QUEUE_KEY) {
      warn!("Failed to clear pending mutation: {}", e);
    }
  }

  /// Clear if the pending entry is `drained` or older than it.
  ///
  /// A snapshot enqueued while `drained` was being pushed stays queued.
  /// Returns true if the queue is now empty.
  pub fn clear_if(&self, drained: &PendingMutation) -> bool {
    match self.pending() {
      Some(current) if current == *drained || current.enqueued_at < drained.enqueued_at => {
        self.clear();
        true
      }
      Some(_) => false,
      None => true,
    }
  }
}
