use crate::api::api_types::{ApiFavourite, ApiNotificationsResponse, ApiUnseenCount, ApiWatch};
use crate::api::gateway::{EntityGateway, GatewayError, GatewayResult};
use crate::api::types::{FavouriteKind, NotificationPage, WatchRecord};
use crate::config::Config;
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the tracker REST API
#[derive(Clone)]
pub struct TrackerApi {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl TrackerApi {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url '{}': {}", config.api.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("API url '{}' cannot carry a path", config.api.url));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(config.api.user_agent.clone())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      token: Config::get_auth_token(),
    })
  }

  /// Build a request for the endpoint under the base path. Each segment is
  /// percent-encoded on its own, so keys cannot add path or query parts.
  fn request(&self, method: Method, segments: &[&str]) -> GatewayResult<RequestBuilder> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| GatewayError::Transport(format!("bad base url {}", self.base)))?
      .pop_if_empty()
      .extend(segments);

    debug!(%method, %url, "api request");

    let builder = self.http.request(method, url);
    Ok(match &self.token {
      Some(token) => builder.header("auth", token),
      None => builder,
    })
  }

  async fn send(&self, builder: RequestBuilder) -> GatewayResult<Response> {
    let response = builder
      .send()
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    match status {
      StatusCode::NOT_FOUND => Err(GatewayError::NotFound),
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
      _ => {
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
          code: status.as_u16(),
          body,
        })
      }
    }
  }

  async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> GatewayResult<T> {
    self
      .send(builder)
      .await?
      .json::<T>()
      .await
      .map_err(|e| GatewayError::Decode(e.to_string()))
  }
}

#[async_trait]
impl EntityGateway for TrackerApi {
  async fn get_watch(&self, key: &str) -> GatewayResult<Option<WatchRecord>> {
    let request = self.request(Method::GET, &["watch", key])?;
    match self.json::<ApiWatch>(request).await {
      Ok(watch) => Ok(Some(watch.into())),
      Err(GatewayError::NotFound) => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn put_watch(&self, key: &str, record: &WatchRecord) -> GatewayResult<()> {
    let request = self
      .request(Method::PUT, &["watch", key])?
      .json(&ApiWatch::from(record));
    self.send(request).await.map(|_| ())
  }

  async fn delete_watch(&self, key: &str) -> GatewayResult<()> {
    let request = self.request(Method::DELETE, &["watch", key])?;
    match self.send(request).await {
      // Already gone is the state we wanted
      Ok(_) | Err(GatewayError::NotFound) => Ok(()),
      Err(e) => Err(e),
    }
  }

  async fn get_favourite(&self, kind: FavouriteKind, key: &str) -> GatewayResult<bool> {
    let request = self.request(Method::GET, &["favourite", kind.as_str(), key])?;
    match self.json::<ApiFavourite>(request).await {
      Ok(favourite) => Ok(favourite.is_favourite()),
      Err(GatewayError::NotFound) => Ok(false),
      Err(e) => Err(e),
    }
  }

  async fn set_favourite(
    &self,
    kind: FavouriteKind,
    key: &str,
    favourite: bool,
  ) -> GatewayResult<()> {
    let method = if favourite { Method::PUT } else { Method::DELETE };
    let request = self.request(method, &["favourite", kind.as_str(), key])?;
    self.send(request).await.map(|_| ())
  }

  async fn list_notifications(&self, page: u32, size: u32) -> GatewayResult<NotificationPage> {
    let request = self
      .request(Method::GET, &["notifications"])?
      .query(&[("page", page), ("size", size)]);
    let response: ApiNotificationsResponse = self.json(request).await?;
    Ok(response.into())
  }

  async fn unseen_count(&self) -> GatewayResult<u32> {
    let request = self.request(Method::GET, &["notifications", "count"])?;
    let response: ApiUnseenCount = self.json(request).await?;
    Ok(response.unseen)
  }

  async fn mark_seen(&self, reference: &str) -> GatewayResult<()> {
    let request = self.request(Method::POST, &["notifications", reference, "seen"])?;
    self.send(request).await.map(|_| ())
  }

  async fn mark_all_seen(&self) -> GatewayResult<()> {
    let request = self.request(Method::POST, &["notifications", "seen", "all"])?;
    self.send(request).await.map(|_| ())
  }
}
