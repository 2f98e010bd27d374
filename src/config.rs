use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{Request, StoreNames};
use crate::sync::UserProfile;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  /// Identity handed over by the external auth flow
  pub user: Option<UserConfig>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
  /// Root of the remote document store, e.g. https://example.org/v1
  pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
  pub id: String,
  pub email: Option<String>,
  pub display_name: Option<String>,
}

impl UserConfig {
  pub fn profile(&self) -> UserProfile {
    UserProfile {
      id: self.id.clone(),
      email: self.email.clone(),
      display_name: self.display_name.clone(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Base URL the shell manifest is resolved against
  pub origin: Option<String>,
  pub name_prefix: String,
  /// Bumping this invalidates the shell store on the next activation
  pub shell_version: String,
  pub data_store: String,
  pub data_patterns: Vec<String>,
  pub manifest: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      origin: None,
      name_prefix: "nu-carnaval".to_string(),
      shell_version: "v7".to_string(),
      data_store: "nu-carnaval-data-v1".to_string(),
      data_patterns: vec![
        "blocos.json".to_string(),
        "api.open-meteo".to_string(),
        "assets/artists".to_string(),
      ],
      manifest: [
        "./",
        "./index.html",
        "./manifest.json",
        "./css/reset.css",
        "./css/variables.css",
        "./css/styles.css",
        "./css/map.css",
        "./css/timeline.css",
        "./js/app.js",
        "./js/data.js",
        "./js/ui.js",
        "./js/map.js",
        "./js/storage.js",
        "./js/notifications.js",
        "./js/firebase.js",
        "./js/weather.js",
        "./assets/icons/icon-192.png",
        "./assets/icons/icon-512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
    }
  }
}

impl CacheConfig {
  pub fn store_names(&self) -> StoreNames {
    StoreNames::new(&self.name_prefix, &self.shell_version, &self.data_store)
  }

  pub fn origin(&self) -> Result<Url> {
    let origin = self
      .origin
      .as_deref()
      .ok_or_else(|| eyre!("cache.origin is not configured"))?;
    Url::parse(origin).map_err(|e| eyre!("Invalid cache.origin '{}': {}", origin, e))
  }

  /// Shell manifest entries resolved against `origin`.
  pub fn manifest_requests(&self) -> Result<Vec<Request>> {
    let origin = self.origin()?;
    self
      .manifest
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map(|url| Request::new(reqwest::Method::GET, url))
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", path, e))
      })
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Delay before the startup drain fires
  pub startup_delay_ms: u64,
  pub probe_interval_secs: u64,
  /// Connectivity probe target (defaults to remote.base_url)
  pub probe_url: Option<String>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      startup_delay_ms: 2000,
      probe_interval_secs: 15,
      probe_url: None,
    }
  }
}

impl SyncConfig {
  pub fn startup_delay(&self) -> Duration {
    Duration::from_millis(self.startup_delay_ms)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./blocos.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/blocos/config.yaml
  ///
  /// Without an explicit path, a missing file means defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("blocos.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("blocos").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn remote_url(&self) -> Result<Option<Url>> {
    self
      .remote
      .base_url
      .as_deref()
      .map(|u| Url::parse(u).map_err(|e| eyre!("Invalid remote.base_url '{}': {}", u, e)))
      .transpose()
  }

  pub fn probe_url(&self) -> Result<Option<Url>> {
    match self.sync.probe_url.as_deref() {
      Some(u) => Url::parse(u)
        .map(Some)
        .map_err(|e| eyre!("Invalid sync.probe_url '{}': {}", u, e)),
      None => self.remote_url(),
    }
  }

  /// Get the remote store token from the environment.
  ///
  /// Checks BLOCOS_REMOTE_TOKEN; the store may also be open.
  pub fn get_remote_token() -> Option<String> {
    std::env::var("BLOCOS_REMOTE_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_missing_sections_use_defaults() {
    let config: Config = serde_yaml::from_str("user:\n  id: u1\n").unwrap();

    assert_eq!(config.user.as_ref().unwrap().profile().id, "u1");
    assert_eq!(config.cache.store_names().shell, "nu-carnaval-shell-v7");
    assert_eq!(config.cache.store_names().data, "nu-carnaval-data-v1");
    assert_eq!(config.sync.startup_delay(), Duration::from_millis(2000));
    assert!(config.remote_url().unwrap().is_none());
  }

  #[test]
  fn test_load_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "remote:\n  base_url: https://example.org/v1\n\
       cache:\n  origin: https://example.org/app/\n  shell_version: v8\n  manifest: ['./', './js/app.js']\n\
       sync:\n  probe_interval_secs: 30\n"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.store_names().shell, "nu-carnaval-shell-v8");
    assert_eq!(config.cache.data_patterns.len(), 3);
    assert_eq!(config.sync.probe_interval(), Duration::from_secs(30));
    assert_eq!(
      config.probe_url().unwrap().unwrap().as_str(),
      "https://example.org/v1"
    );

    let urls: Vec<String> = config
      .cache
      .manifest_requests()
      .unwrap()
      .into_iter()
      .map(|r| r.url.to_string())
      .collect();
    assert_eq!(
      urls,
      vec!["https://example.org/app/", "https://example.org/app/js/app.js"]
    );
  }

  #[test]
  fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn test_manifest_requires_origin() {
    assert!(Config::default().cache.manifest_requests().is_err());
  }
}
