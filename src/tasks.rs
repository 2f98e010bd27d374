//! Fire-and-forget tasks that can still be awaited before shutdown.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::warn;

/// Set of detached background tasks.
///
/// Callers never wait on an individual task; `settle` waits for all of
/// them (including ones spawned while settling).
#[derive(Clone, Default)]
pub struct Background {
  tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Background {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    match self.tasks.lock() {
      Ok(mut tasks) => {
        // Reap finished tasks so long-running processes don't accumulate them
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
      }
      Err(e) => {
        warn!("Background task set poisoned: {}", e);
        tokio::spawn(task);
      }
    }
  }

  /// Wait until every spawned task has finished.
  pub async fn settle(&self) {
    loop {
      let mut tasks = match self.tasks.lock() {
        Ok(mut tasks) => std::mem::take(&mut *tasks),
        Err(_) => return,
      };
      if tasks.is_empty() {
        return;
      }

      while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
          warn!("Background task failed: {}", e);
        }
      }
    }
  }
}
