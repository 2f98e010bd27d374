//! Shared route links (`?roteiro=id1,id2`).

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::set::{FavoriteSet, IdSet};

/// Query parameter carrying the shared route.
pub const ROUTE_PARAM: &str = "roteiro";

/// Build a link sharing `favorites`, or `None` when there is nothing to share.
pub fn share_link(base: &str, favorites: &FavoriteSet) -> Result<Option<Url>> {
  if favorites.is_empty() {
    return Ok(None);
  }

  let mut url = Url::parse(base).map_err(|e| eyre!("Invalid share base '{}': {}", base, e))?;
  let ids = favorites.iter().collect::<Vec<_>>().join(",");
  url.set_query(None);
  url.set_fragment(None);
  url.query_pairs_mut().append_pair(ROUTE_PARAM, &ids);

  Ok(Some(url))
}

/// Extract the route ids from a shared link. A link without a route is empty.
pub fn parse_shared_link(link: &str) -> Result<Vec<String>> {
  let url = Url::parse(link).map_err(|e| eyre!("Invalid shared link '{}': {}", link, e))?;

  let ids: Vec<String> = url
    .query_pairs()
    .find(|(key, _)| key == ROUTE_PARAM)
    .map(|(_, value)| {
      value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
    })
    .unwrap_or_default();

  Ok(ids)
}

/// Keep only ids that name a known event.
pub fn retain_known(ids: Vec<String>, known: &IdSet) -> Vec<String> {
  ids.into_iter().filter(|id| known.contains(id)).collect()
}
