//! Authenticated user handle, owned by the app context.

use std::sync::{Arc, RwLock};
use tracing::info;

/// Identity established by the (external) authentication flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
  /// Stable id keying the remote document
  pub id: String,
  pub email: Option<String>,
  pub display_name: Option<String>,
}

/// Current signed-in user, if any.
#[derive(Clone, Default)]
pub struct Session {
  user: Arc<RwLock<Option<UserProfile>>>,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current_user(&self) -> Option<UserProfile> {
    match self.user.read() {
      Ok(user) => user.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  pub fn sign_in(&self, user: UserProfile) {
    info!(user_id = %user.id, "Signed in");
    match self.user.write() {
      Ok(mut current) => *current = Some(user),
      Err(poisoned) => *poisoned.into_inner() = Some(user),
    }
  }
}
