//! Network boundary: the request/response shapes and the reqwest transport.

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use crate::config::HttpConfig;
use crate::request::HttpMethod;

/// A fully built request, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: HttpMethod,
  pub url: String,
  pub headers: BTreeMap<String, String>,
  /// JSON text, present only for methods that carry a body
  pub body: Option<String>,
}

/// What the executor needs to know about a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Bytes,
}

impl HttpResponse {
  pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      content_type: content_type.map(String::from),
      body: body.into(),
    }
  }

  /// Convenience for a 200 response with a JSON body.
  pub fn json(value: &serde_json::Value) -> Self {
    Self::new(200, Some("application/json"), value.to_string())
  }

  /// True for any 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Something that can perform an HTTP round trip.
///
/// Implementations return the whole body; the executor handles decoding.
pub trait HttpTransport: Send + Sync {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, FetchError>>;
}

impl From<HttpMethod> for reqwest::Method {
  fn from(method: HttpMethod) -> Self {
    match method {
      HttpMethod::Get => reqwest::Method::GET,
      HttpMethod::Post => reqwest::Method::POST,
      HttpMethod::Put => reqwest::Method::PUT,
      HttpMethod::Patch => reqwest::Method::PATCH,
      HttpMethod::Delete => reqwest::Method::DELETE,
      HttpMethod::Options => reqwest::Method::OPTIONS,
      HttpMethod::Head => reqwest::Method::HEAD,
    }
  }
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: Option<Url>,
}

impl ReqwestTransport {
  pub fn new(config: &HttpConfig) -> Result<Self> {
    let base_url = config
      .base_url
      .as_deref()
      .map(Url::parse)
      .transpose()
      .map_err(|e| eyre!("Invalid base URL: {}", e))?;

    let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
    if let Some(timeout_ms) = config.timeout_ms {
      builder = builder.timeout(Duration::from_millis(timeout_ms));
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// Resolve `url` against the configured base URL when it is relative.
  pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
    match Url::parse(url) {
      Ok(absolute) => Ok(absolute),
      Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
        Some(base) => base
          .join(url)
          .map_err(|e| FetchError::Transport(format!("Invalid URL {}: {}", url, e))),
        None => Err(FetchError::Transport(format!(
          "Relative URL {} requires a configured base URL",
          url
        ))),
      },
      Err(e) => Err(FetchError::Transport(format!("Invalid URL {}: {}", url, e))),
    }
  }

  async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
    let url = self.resolve(&request.url)?;

    let mut builder = self.client.request(request.method.into(), url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(String::from);
    let body = response.bytes().await?;

    Ok(HttpResponse {
      status,
      content_type,
      body,
    })
  }
}

impl HttpTransport for ReqwestTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, FetchError>> {
    Box::pin(self.round_trip(request))
  }
}
