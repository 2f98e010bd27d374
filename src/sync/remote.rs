//! Remote authoritative store for per-user favorites documents.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::favorites::FavoriteSet;

/// The only error kinds the sync core surfaces to its callers.
///
/// Everything else (timeouts, 5xx, unexpected statuses, bad bodies) is
/// logged and folded into `RemoteUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
  #[error("remote store unavailable: {0}")]
  RemoteUnavailable(String),
  #[error("permission denied: {0}")]
  PermissionDenied(String),
}

impl From<reqwest::Error> for RemoteError {
  fn from(e: reqwest::Error) -> Self {
    Self::RemoteUnavailable(e.to_string())
  }
}

/// Per-user document held by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFavoriteDocument {
  #[serde(default)]
  pub favorites: FavoriteSet,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  /// ISO-8601 creation timestamp
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

/// Remote document store keyed by stable user id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Fetch the user's document, `None` if it was never created.
  async fn fetch_document(
    &self,
    user_id: &str,
  ) -> Result<Option<RemoteFavoriteDocument>, RemoteError>;

  /// Replace the `favorites` field wholesale, leaving profile fields alone.
  async fn replace_favorites(
    &self,
    user_id: &str,
    favorites: &FavoriteSet,
  ) -> Result<(), RemoteError>;

  /// Create (or overwrite) the whole document.
  async fn create_document(
    &self,
    user_id: &str,
    document: &RemoteFavoriteDocument,
  ) -> Result<(), RemoteError>;
}

/// REST document store: `GET|PATCH|PUT {base}/users/{id}`.
#[derive(Clone)]
pub struct HttpRemoteStore {
  client: Client,
  base: Url,
  token: Option<String>,
}

#[derive(Serialize)]
struct FavoritesPatch<'a> {
  favorites: &'a FavoriteSet,
}

impl HttpRemoteStore {
  pub fn new(base: Url, token: Option<String>) -> Self {
    Self {
      client: Client::new(),
      base,
      token,
    }
  }

  fn document_url(&self, user_id: &str) -> Result<Url, RemoteError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| RemoteError::RemoteUnavailable(format!("Invalid base url {}", self.base)))?
      .pop_if_empty()
      .push("users")
      .push(user_id);
    Ok(url)
  }

  fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify(status, &body))
  }
}

/// Map a non-success status onto the two surfaced error kinds.
fn classify(status: StatusCode, body: &str) -> RemoteError {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
      RemoteError::PermissionDenied(format!("{}: {}", status, body))
    }
    _ => {
      warn!(%status, "Remote store rejected request: {}", body);
      RemoteError::RemoteUnavailable(format!("{}: {}", status, body))
    }
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn fetch_document(
    &self,
    user_id: &str,
  ) -> Result<Option<RemoteFavoriteDocument>, RemoteError> {
    let url = self.document_url(user_id)?;
    let response = self.authorize(self.client.get(url)).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
      debug!(user_id, "No remote document yet");
      return Ok(None);
    }

    let response = Self::check(response).await?;
    let document = response.json::<RemoteFavoriteDocument>().await.map_err(|e| {
      warn!("Unreadable remote document for {}: {}", user_id, e);
      RemoteError::RemoteUnavailable(format!("Failed to decode document: {}", e))
    })?;

    Ok(Some(document))
  }

  async fn replace_favorites(
    &self,
    user_id: &str,
    favorites: &FavoriteSet,
  ) -> Result<(), RemoteError> {
    let url = self.document_url(user_id)?;
    let response = self
      .authorize(self.client.patch(url))
      .json(&FavoritesPatch { favorites })
      .send()
      .await?;

    Self::check(response).await?;
    Ok(())
  }

  async fn create_document(
    &self,
    user_id: &str,
    document: &RemoteFavoriteDocument,
  ) -> Result<(), RemoteError> {
    let url = self.document_url(user_id)?;
    let response = self
      .authorize(self.client.put(url))
      .json(document)
      .send()
      .await?;

    Self::check(response).await?;
    Ok(())
  }
}

/// Stand-in used when no remote store is configured; every call is unavailable.
pub struct UnconfiguredRemote;

impl UnconfiguredRemote {
  fn error() -> RemoteError {
    RemoteError::RemoteUnavailable("no remote store configured".to_string())
  }
}

#[async_trait]
impl RemoteStore for UnconfiguredRemote {
  async fn fetch_document(
    &self,
    _user_id: &str,
  ) -> Result<Option<RemoteFavoriteDocument>, RemoteError> {
    Err(Self::error())
  }

  async fn replace_favorites(
    &self,
    _user_id: &str,
    _favorites: &FavoriteSet,
  ) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn create_document(
    &self,
    _user_id: &str,
    _document: &RemoteFavoriteDocument,
  ) -> Result<(), RemoteError> {
    Err(Self::error())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn store(server: &MockServer) -> HttpRemoteStore {
    let base = Url::parse(&format!("{}/v1/", server.uri())).unwrap();
    HttpRemoteStore::new(base, Some("secret".to_string()))
  }

  #[tokio::test]
  async fn test_fetch_missing_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/users/u1"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let remote = store(&server).await;
    assert_eq!(remote.fetch_document("u1").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_fetch_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/users/u1"))
      .and(header("Authorization", "Bearer secret"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "favorites": ["b", "c"],
        "email": "folia@example.org",
        "createdAt": "2026-02-01T10:00:00.000Z"
      })))
      .mount(&server)
      .await;

    let remote = store(&server).await;
    let document = remote.fetch_document("u1").await.unwrap().unwrap();
    assert_eq!(document.favorites, ["b", "c"].into_iter().collect());
    assert_eq!(document.email.as_deref(), Some("folia@example.org"));
    assert_eq!(document.display_name, None);
  }

  #[tokio::test]
  async fn test_replace_favorites_sends_field_only() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/v1/users/u1"))
      .and(body_json(json!({ "favorites": ["bloco-x"] })))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let remote = store(&server).await;
    let favorites = ["bloco-x"].into_iter().collect();
    remote.replace_favorites("u1", &favorites).await.unwrap();
  }

  #[tokio::test]
  async fn test_create_document() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/v1/users/u1"))
      .and(body_json(json!({
        "favorites": ["a"],
        "email": "folia@example.org",
        "displayName": "Folia",
        "createdAt": "2026-02-01T10:00:00.000Z"
      })))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let remote = store(&server).await;
    let document = RemoteFavoriteDocument {
      favorites: ["a"].into_iter().collect(),
      email: Some("folia@example.org".to_string()),
      display_name: Some("Folia".to_string()),
      created_at: Some("2026-02-01T10:00:00.000Z".to_string()),
    };
    remote.create_document("u1", &document).await.unwrap();
  }

  #[tokio::test]
  async fn test_forbidden_is_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .respond_with(ResponseTemplate::new(403).set_body_string("rules"))
      .mount(&server)
      .await;

    let remote = store(&server).await;
    let err = remote
      .replace_favorites("u1", &FavoriteSet::new())
      .await
      .unwrap_err();
    assert!(matches!(err, RemoteError::PermissionDenied(_)));
  }

  #[tokio::test]
  async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;
    Mock::given(method("PUT"))
      .respond_with(ResponseTemplate::new(409))
      .mount(&server)
      .await;

    let remote = store(&server).await;
    assert!(matches!(
      remote.fetch_document("u1").await,
      Err(RemoteError::RemoteUnavailable(_))
    ));
    assert!(matches!(
      remote
        .create_document("u1", &RemoteFavoriteDocument::default())
        .await,
      Err(RemoteError::RemoteUnavailable(_))
    ));
  }

  #[tokio::test]
  async fn test_undecodable_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
      .mount(&server)
      .await;

    let remote = store(&server).await;
    assert!(matches!(
      remote.fetch_document("u1").await,
      Err(RemoteError::RemoteUnavailable(_))
    ));
  }

  #[tokio::test]
  async fn test_unreachable_host_is_unavailable() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap()
      .port();
    let base = Url::parse(&format!("http://127.0.0.1:{}/v1/", port)).unwrap();

    let remote = HttpRemoteStore::new(base, None);
    assert!(matches!(
      remote.fetch_document("u1").await,
      Err(RemoteError::RemoteUnavailable(_))
    ));
  }

  #[test]
  fn test_document_url_escapes_user_id() {
    let remote = HttpRemoteStore::new(Url::parse("https://example.org/v1").unwrap(), None);
    let url = remote.document_url("a/b c").unwrap();
    assert_eq!(url.as_str(), "https://example.org/v1/users/a%2Fb%20c");
  }

  #[tokio::test]
  async fn test_unconfigured_remote_is_unavailable() {
    let remote = UnconfiguredRemote;
    assert!(matches!(
      remote.replace_favorites("u1", &FavoriteSet::new()).await,
      Err(RemoteError::RemoteUnavailable(_))
    ));
  }
}
