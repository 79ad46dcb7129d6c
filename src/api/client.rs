use crate::api::api_types::{ApiCollection, ApiSourceConnection};
use crate::api::types::{Collection, SourceConnection};
use crate::api::CollectionsApi;
use crate::config::Config;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the collections backend
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_base_url(
      &config.api.url,
      Config::get_api_key(),
      Duration::from_secs(config.api.timeout_secs),
    )
  }

  pub fn with_base_url(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
    // Url::join drops the last path segment unless it ends with a slash
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("colcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  /// GET a JSON document, turning non-success statuses into errors carrying the body text
  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    debug!(%url, "GET");

    let mut request = self.http.get(url.clone());
    if let Some(key) = &self.api_key {
      request = request.header("x-api-key", key);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("HTTP {}: {}", status, body.trim()));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  /// Get all collections
  pub async fn get_collections(&self) -> Result<Vec<Collection>> {
    let url = self.endpoint("collections")?;
    let collections: Vec<ApiCollection> = self.get_json(url).await?;

    Ok(collections.into_iter().map(Collection::from).collect())
  }

  /// Get the source connections of a single collection
  pub async fn get_source_connections(&self, collection_id: &str) -> Result<Vec<SourceConnection>> {
    let mut url = self.endpoint("source-connections/")?;
    url
      .query_pairs_mut()
      .append_pair("collection", collection_id);

    let connections: Vec<ApiSourceConnection> = self.get_json(url).await?;

    Ok(
      connections
        .into_iter()
        .map(SourceConnection::from)
        .collect(),
    )
  }
}

impl CollectionsApi for ApiClient {
  async fn list_collections(&self) -> Result<Vec<Collection>> {
    self.get_collections().await
  }

  async fn list_source_connections(&self, collection_id: &str) -> Result<Vec<SourceConnection>> {
    self.get_source_connections(collection_id).await
  }
}
