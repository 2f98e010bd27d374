//! Cache layer that routes every request through its tier's policy.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::tasks::Background;

use super::rules::{Rules, Tier};
use super::storage::{CacheStorage, StoreInfo};
use super::traits::{CacheResult, CacheSource, Fetcher, Request, Response};

/// Names of the two live cache stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
  /// Versioned shell store, e.g. `nu-carnaval-shell-v7`
  pub shell: String,
  /// Data store, stable across shell versions
  pub data: String,
}

impl StoreNames {
  pub fn new(prefix: &str, shell_version: &str, data: &str) -> Self {
    Self {
      shell: format!("{}-shell-{}", prefix, shell_version),
      data: data.to_string(),
    }
  }
}

/// Cache layer intercepting outbound fetches.
///
/// The shell tier is cache-first and only populated by `install`. The data
/// tier serves the cached copy immediately and refreshes it in the
/// background, so freshness lags by one access.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  fetcher: Arc<dyn Fetcher>,
  rules: Arc<Rules>,
  names: Arc<StoreNames>,
  revalidations: Background,
}

impl<S: CacheStorage + 'static> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S, fetcher: Arc<dyn Fetcher>, rules: Rules, names: StoreNames) -> Self {
    Self {
      storage: Arc::new(storage),
      fetcher,
      rules: Arc::new(rules),
      names: Arc::new(names),
      revalidations: Background::new(),
    }
  }

  pub fn names(&self) -> &StoreNames {
    &self.names
  }

  /// Fetch `request` through the tier it classifies into.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    match self.rules.classify(request) {
      Tier::Passthrough => {
        let response = self.fetcher.fetch(request).await?;
        Ok(CacheResult::from_network(response))
      }
      Tier::Shell => self.fetch_shell(request).await,
      Tier::Data => self.fetch_data(request).await,
    }
  }

  async fn fetch_shell(&self, request: &Request) -> Result<CacheResult<Response>> {
    if let Some(cached) = self.storage.lookup(&self.names.shell, request)? {
      debug!(url = %request.url, "Shell hit");
      return Ok(CacheResult::from_cache(
        cached.response,
        cached.cached_at,
        CacheSource::Shell,
      ));
    }

    // Runtime traffic never populates the shell store
    debug!(url = %request.url, "Shell miss");
    let response = self.fetcher.fetch(request).await?;
    Ok(CacheResult::from_network(response))
  }

  async fn fetch_data(&self, request: &Request) -> Result<CacheResult<Response>> {
    if let Some(cached) = self.storage.lookup(&self.names.data, request)? {
      debug!(url = %request.url, "Data hit, revalidating");
      self.revalidate(request.clone());
      return Ok(CacheResult::from_cache(
        cached.response,
        cached.cached_at,
        CacheSource::Stale,
      ));
    }

    // No cache, must fetch from network
    let response = self.fetcher.fetch(request).await?;
    if response.is_ok() {
      if let Err(e) = self.storage.put(&self.names.data, request, &response) {
        warn!("Failed to cache {}: {}", request.url, e);
      }
    }
    Ok(CacheResult::from_network(response))
  }

  fn revalidate(&self, request: Request) {
    let storage = Arc::clone(&self.storage);
    let fetcher = Arc::clone(&self.fetcher);
    let names = Arc::clone(&self.names);

    self.revalidations.spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) if response.is_ok() => {
          if let Err(e) = storage.put(&names.data, &request, &response) {
            warn!("Failed to refresh {}: {}", request.url, e);
          }
        }
        Ok(response) => debug!(url = %request.url, status = response.status, "Kept cached copy"),
        Err(e) => debug!("Revalidation failed: {}", e),
      }
    });
  }

  /// Pre-fetch the shell manifest into the current shell store.
  ///
  /// All-or-nothing: if any asset fails, the store is left untouched.
  pub async fn install(&self, manifest: &[Request]) -> Result<usize> {
    info!(store = %self.names.shell, assets = manifest.len(), "Installing shell");

    let responses = join_all(manifest.iter().map(|request| self.fetcher.fetch(request))).await;

    let mut entries = Vec::with_capacity(manifest.len());
    for (request, response) in manifest.iter().zip(responses) {
      let response = response?;
      if !response.is_ok() {
        return Err(eyre!(
          "Shell install failed: {} returned {}",
          request.url,
          response.status
        ));
      }
      entries.push((request.clone(), response));
    }

    self.storage.replace_all(&self.names.shell, &entries)?;
    Ok(entries.len())
  }

  /// Delete every store that is neither the current shell nor the data store.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in self.storage.store_names()? {
      if name == self.names.shell || name == self.names.data {
        continue;
      }
      if self.storage.delete_store(&name)? {
        info!(store = %name, "Removed old cache");
        deleted.push(name);
      }
    }
    Ok(deleted)
  }

  pub fn stores(&self) -> Result<Vec<StoreInfo>> {
    self.storage.stores()
  }

  /// Wait for in-flight background revalidations.
  pub async fn settle(&self) {
    self.revalidations.settle().await;
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      rules: Arc::clone(&self.rules),
      names: Arc::clone(&self.names),
      revalidations: self.revalidations.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::db::Database;
  use async_trait::async_trait;
  use reqwest::Method;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Fetcher answering from a script and counting calls per url.
  #[derive(Default)]
  struct ScriptedFetcher {
    script: Mutex<HashMap<String, Option<Response>>>,
    calls: Mutex<HashMap<String, usize>>,
  }

  impl ScriptedFetcher {
    fn respond(&self, url: &str, body: &str) {
      self.script.lock().unwrap().insert(url.to_string(), Some(ok(body)));
    }

    fn respond_status(&self, url: &str, status: u16) {
      let response = Response {
        status,
        content_type: None,
        body: Vec::new(),
      };
      self.script.lock().unwrap().insert(url.to_string(), Some(response));
    }

    fn fail(&self, url: &str) {
      self.script.lock().unwrap().insert(url.to_string(), None);
    }

    fn calls(&self, url: &str) -> usize {
      self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
  }

  #[async_trait]
  impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      let url = request.url.to_string();
      *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;
      match self.script.lock().unwrap().get(&url).cloned().flatten() {
        Some(response) => Ok(response),
        None => Err(eyre!("Network unreachable: {}", url)),
      }
    }
  }

  fn ok(body: &str) -> Response {
    Response {
      status: 200,
      content_type: Some("text/plain".to_string()),
      body: body.as_bytes().to_vec(),
    }
  }

  const APP_JS: &str = "https://example.org/js/app.js";
  const INDEX: &str = "https://example.org/index.html";
  const BLOCOS: &str = "https://example.org/data/blocos.json";

  fn layer_with(db: Database, version: &str) -> (CacheLayer<SqliteStorage>, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let layer = CacheLayer::new(
      SqliteStorage::new(db),
      fetcher.clone(),
      Rules::new(vec!["blocos.json".to_string()]),
      StoreNames::new("nu-carnaval", version, "nu-carnaval-data-v1"),
    );
    (layer, fetcher)
  }

  fn layer() -> (CacheLayer<SqliteStorage>, Arc<ScriptedFetcher>) {
    layer_with(Database::open_in_memory().unwrap(), "v7")
  }

  fn get(url: &str) -> Request {
    Request::get(url).unwrap()
  }

  #[tokio::test]
  async fn test_installed_shell_asset_never_hits_network() {
    let (layer, fetcher) = layer();
    fetcher.respond(APP_JS, "v7 app");

    assert_eq!(layer.install(&[get(APP_JS)]).await.unwrap(), 1);
    assert_eq!(fetcher.calls(APP_JS), 1);

    fetcher.respond(APP_JS, "newer app");
    for _ in 0..3 {
      let result = layer.fetch(&get(APP_JS)).await.unwrap();
      assert_eq!(result.source, CacheSource::Shell);
      assert_eq!(result.data, ok("v7 app"));
    }
    assert_eq!(fetcher.calls(APP_JS), 1);
  }

  #[tokio::test]
  async fn test_shell_miss_does_not_populate() {
    let (layer, fetcher) = layer();
    fetcher.respond(INDEX, "index");

    for _ in 0..2 {
      let result = layer.fetch(&get(INDEX)).await.unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }
    assert_eq!(fetcher.calls(INDEX), 2);
    assert!(layer.stores().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_data_is_stale_then_fresh() {
    let (layer, fetcher) = layer();
    fetcher.respond(BLOCOS, "v1");

    let first = layer.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data, ok("v1"));

    fetcher.respond(BLOCOS, "v2");
    let second = layer.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(second.source, CacheSource::Stale);
    assert_eq!(second.data, ok("v1"));

    layer.settle().await;
    let third = layer.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(third.data, ok("v2"));
  }

  #[tokio::test]
  async fn test_data_miss_with_network_failure_rejects() {
    let (layer, fetcher) = layer();
    fetcher.fail(BLOCOS);
    assert!(layer.fetch(&get(BLOCOS)).await.is_err());
  }

  #[tokio::test]
  async fn test_data_hit_survives_network_failure() {
    let (layer, fetcher) = layer();
    fetcher.respond(BLOCOS, "v1");
    layer.fetch(&get(BLOCOS)).await.unwrap();

    fetcher.fail(BLOCOS);
    let result = layer.fetch(&get(BLOCOS)).await.unwrap();
    layer.settle().await;
    assert_eq!(result.data, ok("v1"));
    assert_eq!(layer.fetch(&get(BLOCOS)).await.unwrap().data, ok("v1"));
  }

  #[tokio::test]
  async fn test_error_responses_are_not_cached() {
    let (layer, fetcher) = layer();
    fetcher.respond_status(BLOCOS, 500);

    let result = layer.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(result.data.status, 500);

    fetcher.respond(BLOCOS, "v1");
    let result = layer.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let (layer, fetcher) = layer();
    fetcher.respond(APP_JS, "app");
    fetcher.respond(INDEX, "index");
    layer.install(&[get(APP_JS)]).await.unwrap();

    fetcher.respond_status(INDEX, 404);
    assert!(layer.install(&[get(APP_JS), get(INDEX)]).await.is_err());
    fetcher.fail(INDEX);
    assert!(layer.install(&[get(APP_JS), get(INDEX)]).await.is_err());

    let result = layer.fetch(&get(APP_JS)).await.unwrap();
    assert_eq!(result.source, CacheSource::Shell);
  }

  #[tokio::test]
  async fn test_activation_removes_old_versions() {
    let db = Database::open_in_memory().unwrap();
    let (old, fetcher) = layer_with(db.clone(), "v6");
    fetcher.respond(APP_JS, "v6 app");
    fetcher.respond(BLOCOS, "data");
    old.install(&[get(APP_JS)]).await.unwrap();
    old.fetch(&get(BLOCOS)).await.unwrap();

    let (new, fetcher) = layer_with(db.clone(), "v7");
    fetcher.respond(INDEX, "v7 index");
    new.install(&[get(INDEX)]).await.unwrap();
    SqliteStorage::new(db)
      .replace_all("someone-elses-cache", &[])
      .unwrap();

    let mut deleted = new.activate().unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["nu-carnaval-shell-v6", "someone-elses-cache"]);

    let names: Vec<String> = new.stores().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["nu-carnaval-data-v1", "nu-carnaval-shell-v7"]);

    // Data survives the shell upgrade
    let result = new.fetch(&get(BLOCOS)).await.unwrap();
    assert_eq!(result.source, CacheSource::Stale);
    new.settle().await;
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let (layer, fetcher) = layer();
    fetcher.respond(BLOCOS, "posted");
    let request = Request::new(Method::POST, get(BLOCOS).url);

    layer.fetch(&request).await.unwrap();
    layer.fetch(&request).await.unwrap();
    assert_eq!(fetcher.calls(BLOCOS), 2);
    assert!(layer.stores().unwrap().is_empty());
  }
}
