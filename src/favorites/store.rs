//! Local favorites and check-ins backed by the durable record.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::LocalRecord;

use super::set::{CheckinSet, FavoriteSet, IdSet};

/// Record key holding the favorites array.
pub const FAVORITES_KEY: &str = "favorites";
/// Record key holding the check-ins array.
pub const CHECKINS_KEY: &str = "checkins";

/// Synchronous favorites and check-ins store.
///
/// No operation fails visibly: read errors yield an empty set and write
/// errors are logged while the attempted state is still returned.
#[derive(Clone)]
pub struct FavoritesStore {
  record: Arc<dyn LocalRecord>,
}

impl FavoritesStore {
  pub fn new(record: Arc<dyn LocalRecord>) -> Self {
    Self { record }
  }

  pub fn get_favorites(&self) -> FavoriteSet {
    self.load(FAVORITES_KEY)
  }

  pub fn is_favorite(&self, id: &str) -> bool {
    self.get_favorites().contains(id)
  }

  /// Flip membership of `id`; returns the new membership and the attempted full set.
  pub fn toggle_favorite(&self, id: &str) -> (bool, FavoriteSet) {
    self.toggle(FAVORITES_KEY, id)
  }

  /// Add every id not already present; returns how many were added.
  ///
  /// Nothing is written when all ids are already favorites, so replaying
  /// an import is a no-op.
  pub fn import_favorites<I, S>(&self, ids: I) -> usize
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.import_favorites_snapshot(ids).0
  }

  /// Like `import_favorites`, also returning the attempted full set.
  pub fn import_favorites_snapshot<I, S>(&self, ids: I) -> (usize, FavoriteSet)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut favorites = self.get_favorites();
    let added = ids
      .into_iter()
      .fold(0, |added, id| added + usize::from(favorites.insert(id)));

    if added > 0 {
      self.save(FAVORITES_KEY, &favorites);
    }
    debug!(added, total = favorites.len(), "Imported favorites");
    (added, favorites)
  }

  pub fn clear_favorites(&self) {
    if let Err(e) = self.record.remove(FAVORITES_KEY) {
      warn!("Failed to clear favorites: {}", e);
    }
  }

  pub fn get_checkins(&self) -> CheckinSet {
    self.load(CHECKINS_KEY)
  }

  pub fn is_checked_in(&self, id: &str) -> bool {
    self.get_checkins().contains(id)
  }

  /// Flip the check-in for `id` and return whether it is now checked in.
  pub fn toggle_checkin(&self, id: &str) -> bool {
    self.toggle(CHECKINS_KEY, id).0
  }

  pub fn checkin_count(&self) -> usize {
    self.get_checkins().len()
  }

  fn toggle(&self, key: &str, id: &str) -> (bool, IdSet) {
    let mut set = self.load(key);
    let member = if set.remove(id) {
      false
    } else {
      set.insert(id)
    };
    self.save(key, &set);
    (member, set)
  }

  fn load(&self, key: &str) -> IdSet {
    let raw = match self.record.read(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return IdSet::new(),
      Err(e) => {
        warn!("Failed to read {}: {}", key, e);
        return IdSet::new();
      }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
      warn!("Discarding unreadable {} record: {}", key, e);
      IdSet::new()
    })
  }

  fn save(&self, key: &str, set: &IdSet) {
    let result = serde_json::to_string(set)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize {}: {}", key, e))
      .and_then(|json| self.record.write(key, &json));

    // The caller keeps the attempted state even if it did not persist
    if let Err(e) = result {
      warn!("Failed to save {} (storage full?): {}", key, e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::record::testing::FlakyRecord;
  use crate::db::Database;

  fn store() -> FavoritesStore {
    FavoritesStore::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn set(ids: &[&str]) -> IdSet {
    ids.iter().copied().collect()
  }

  #[test]
  fn test_toggle_twice_restores_membership() {
    let store = store();
    store.import_favorites(["a"]);

    for id in ["a", "b"] {
      let before = store.get_favorites();
      store.toggle_favorite(id);
      store.toggle_favorite(id);
      assert_eq!(store.get_favorites(), before);
    }
  }

  #[test]
  fn test_toggle_returns_new_membership() {
    let store = store();
    assert!(store.toggle_favorite("bloco-x").0);
    assert!(store.is_favorite("bloco-x"));
    assert!(!store.toggle_favorite("bloco-x").0);
    assert!(!store.is_favorite("bloco-x"));
  }

  #[test]
  fn test_import_is_union() {
    let store = store();
    let a = set(&["a", "b"]);
    let a_and_b = set(&["a", "b", "c", "d"]);

    assert_eq!(store.import_favorites(a.clone()), 2);
    assert_eq!(store.import_favorites(a_and_b.clone()), 2);
    assert!(store.get_favorites().is_superset(&a_and_b));
  }

  #[test]
  fn test_reimport_adds_nothing() {
    let store = store();
    store.import_favorites(["a", "b"]);
    assert_eq!(store.import_favorites(["b", "a", "a"]), 0);
    assert_eq!(store.get_favorites().len(), 2);
  }

  #[test]
  fn test_write_failure_is_absorbed() {
    let record = Arc::new(FlakyRecord::new());
    let store = FavoritesStore::new(record.clone());
    record.set_full(true);

    let (member, attempted) = store.toggle_favorite("a");
    assert!(member);
    assert!(attempted.contains("a"));
    assert_eq!(store.import_favorites(["b"]), 1);
    assert!(store.get_favorites().is_empty());

    record.set_full(false);
    assert!(store.toggle_favorite("a").0);
    assert!(store.is_favorite("a"));
  }

  #[test]
  fn test_corrupt_record_reads_as_empty() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.write(FAVORITES_KEY, "not json").unwrap();
    let store = FavoritesStore::new(db);
    assert!(store.get_favorites().is_empty());
    assert!(store.toggle_favorite("a").0);
    assert_eq!(store.get_favorites(), set(&["a"]));
  }

  #[test]
  fn test_checkins_are_independent() {
    let store = store();
    assert!(store.toggle_checkin("a"));
    assert!(store.is_checked_in("a"));
    assert!(!store.is_favorite("a"));
    assert_eq!(store.checkin_count(), 1);

    store.toggle_favorite("b");
    store.clear_favorites();
    assert!(store.get_favorites().is_empty());
    assert_eq!(store.checkin_count(), 1);

    assert!(!store.toggle_checkin("a"));
    assert_eq!(store.checkin_count(), 0);
  }
}
