//! Push and login-time union merge against the remote store.

use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::info;

use crate::favorites::{FavoriteSet, FavoritesStore};

use super::remote::{RemoteError, RemoteFavoriteDocument, RemoteStore};
use super::session::UserProfile;

#[derive(Clone)]
pub struct Reconciler {
  remote: Arc<dyn RemoteStore>,
  store: FavoritesStore,
}

impl Reconciler {
  pub fn new(remote: Arc<dyn RemoteStore>, store: FavoritesStore) -> Self {
    Self { remote, store }
  }

  /// Overwrite the remote favorites with `snapshot`. Last write wins.
  pub async fn push(&self, user: &UserProfile, snapshot: &FavoriteSet) -> Result<(), RemoteError> {
    self.remote.replace_favorites(&user.id, snapshot).await?;
    info!(user_id = %user.id, count = snapshot.len(), "Pushed favorites");
    Ok(())
  }

  /// Merge local and remote favorites by set union on first contact.
  ///
  /// The union is written to the local store and to the remote document.
  /// A missing remote document is created from `local` plus the profile.
  /// Removals never propagate through this path.
  pub async fn reconcile_on_login(
    &self,
    user: &UserProfile,
    local: &FavoriteSet,
  ) -> Result<FavoriteSet, RemoteError> {
    let Some(document) = self.remote.fetch_document(&user.id).await? else {
      info!(user_id = %user.id, "Creating remote favorites document");
      let document = RemoteFavoriteDocument {
        favorites: local.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        created_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
      };
      self.remote.create_document(&user.id, &document).await?;
      return Ok(local.clone());
    };

    let merged = local.union(&document.favorites);
    info!(
      local = local.len(),
      remote = document.favorites.len(),
      merged = merged.len(),
      "Reconciling favorites"
    );

    self.store.import_favorites(merged.clone());
    self.remote.replace_favorites(&user.id, &merged).await?;
    Ok(merged)
  }
}
