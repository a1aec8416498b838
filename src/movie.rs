use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::constants::constants;

/// A metadata lookup response. Only the three displayed fields are typed;
/// everything else the API returns is kept untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
  #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(rename = "Year", default, skip_serializing_if = "Option::is_none")]
  pub year: Option<String>,
  #[serde(rename = "Poster", default, skip_serializing_if = "Option::is_none")]
  pub poster: Option<String>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MovieRecord {
  /// The matched title, if the response carries a non-empty one.
  pub fn matched_title(&self) -> Option<&str> {
    self.title.as_deref().filter(|t| !t.is_empty())
  }
}

/// The two HTTP collaborators the search coordinator talks to.
#[async_trait]
pub trait MovieApi: Send + Sync + 'static {
  /// Look up metadata for a movie name.
  async fn lookup(&self, name: &str) -> Result<MovieRecord>;

  /// Tell the server which movie the live stream should follow. Only completion matters.
  async fn notify_update(&self, name: &str) -> Result<()>;
}

pub struct HttpMovieApi {
  client: Client,
  metadata_endpoint: String,
  api_key: Option<String>,
  update_url: String,
}

impl HttpMovieApi {
  pub fn new(client: Client, settings: &Settings) -> Self {
    Self {
      client,
      metadata_endpoint: settings.metadata_endpoint.clone(),
      api_key: settings.api_key.clone(),
      update_url: format!("{}{}", settings.server_url, constants().update_path),
    }
  }

  fn lookup_url(&self, name: &str) -> Result<Url> {
    let mut params = vec![("t", name), ("r", "json")];
    if let Some(ref key) = self.api_key {
      params.push(("apikey", key.as_str()));
    }
    Url::parse_with_params(&self.metadata_endpoint, &params)
      .with_context(|| format!("Invalid metadata endpoint: {}", self.metadata_endpoint))
  }

  fn update_url(&self, name: &str) -> Result<Url> {
    Url::parse_with_params(&self.update_url, &[("name", name)])
      .with_context(|| format!("Invalid update endpoint: {}", self.update_url))
  }
}

#[async_trait]
impl MovieApi for HttpMovieApi {
  async fn lookup(&self, name: &str) -> Result<MovieRecord> {
    let url = self.lookup_url(name)?;
    debug!(url = %url, "movie: lookup request");
    let response = self.client.get(url).send().await.context("Metadata request failed")?;
    if !response.status().is_success() {
      return Err(anyhow!("Metadata request failed with status {}", response.status()));
    }
    response.json::<MovieRecord>().await.context("Metadata response was not valid JSON")
  }

  async fn notify_update(&self, name: &str) -> Result<()> {
    let url = self.update_url(name)?;
    debug!(url = %url, "movie: update notification");
    let response = self.client.get(url).send().await.context("Update request failed")?;
    if !response.status().is_success() {
      return Err(anyhow!("Update request failed with status {}", response.status()));
    }
    Ok(())
  }
}

/// Whether a presenter poster reference points at a fetchable image.
/// The API uses `N/A` for movies without a poster.
pub fn is_remote_poster(poster: &str) -> bool {
  poster.starts_with("http://") || poster.starts_with("https://")
}

pub async fn fetch_poster(client: &Client, url: &str) -> Result<DynamicImage> {
  let response = client.get(url).send().await.with_context(|| format!("Failed to request poster {}", url))?;
  if !response.status().is_success() {
    return Err(anyhow!("Poster request failed with status {} (URL: {})", response.status(), url));
  }
  let image_bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", url))?;
  image::load_from_memory(&image_bytes).with_context(|| format!("Failed to decode image from memory (URL: {})", url))
}
