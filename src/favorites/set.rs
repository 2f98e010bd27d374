//! Unordered identifier sets persisted as JSON arrays.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of opaque event identifiers.
///
/// Serializes as a JSON array of strings. Duplicates in the input collapse,
/// and iteration order carries no meaning (it happens to be sorted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet(BTreeSet<String>);

/// Events the user wants to attend.
pub type FavoriteSet = IdSet;

/// Events the user confirmed attending.
pub type CheckinSet = IdSet;

impl IdSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.0.contains(id)
  }

  /// Returns true if the id was not present.
  pub fn insert(&mut self, id: impl Into<String>) -> bool {
    self.0.insert(id.into())
  }

  /// Returns true if the id was present.
  pub fn remove(&mut self, id: &str) -> bool {
    self.0.remove(id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  /// Set union of `self` and `other`.
  pub fn union(&self, other: &IdSet) -> IdSet {
    IdSet(self.0.union(&other.0).cloned().collect())
  }

  pub fn is_superset(&self, other: &IdSet) -> bool {
    self.0.is_superset(&other.0)
  }
}

impl<S: Into<String>> FromIterator<S> for IdSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    IdSet(iter.into_iter().map(Into::into).collect())
  }
}

impl IntoIterator for IdSet {
  type Item = String;
  type IntoIter = std::collections::btree_set::IntoIter<String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

impl<'a> IntoIterator for &'a IdSet {
  type Item = &'a String;
  type IntoIter = std::collections::btree_set::Iter<'a, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_duplicates_collapse_on_parse() {
    let set: IdSet = serde_json::from_str(r#"["b", "a", "b"]"#).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(serde_json::to_string(&set).unwrap(), r#"["a","b"]"#);
  }

  #[test]
  fn test_union() {
    let local: IdSet = ["a", "b"].into_iter().collect();
    let remote: IdSet = ["b", "c"].into_iter().collect();
    let merged = local.union(&remote);
    assert_eq!(merged, ["a", "b", "c"].into_iter().collect());
    assert!(merged.is_superset(&local));
    assert!(merged.is_superset(&remote));
  }
}
