//! Request normalization and cache key derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Cache time applied when the caller does not set one.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_millis(300_000);

/// HTTP methods a subscription may issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
  #[default]
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Head,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
      Self::Options => "OPTIONS",
      Self::Head => "HEAD",
    }
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(String);

impl FromStr for HttpMethod {
  type Err = ParseMethodError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Self::Get),
      "POST" => Ok(Self::Post),
      "PUT" => Ok(Self::Put),
      "PATCH" => Ok(Self::Patch),
      "DELETE" => Ok(Self::Delete),
      "OPTIONS" => Ok(Self::Options),
      "HEAD" => Ok(Self::Head),
      _ => Err(ParseMethodError(s.to_string())),
    }
  }
}

/// Caller-supplied request options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
  pub method: Option<HttpMethod>,
  pub body: Option<Value>,
  pub headers: Option<BTreeMap<String, String>>,
  pub cache_time: Option<Duration>,
}

impl FetchOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_method(mut self, method: HttpMethod) -> Self {
    self.method = Some(method);
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  /// Add a single header, creating the header map if needed.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self
      .headers
      .get_or_insert_with(BTreeMap::new)
      .insert(name.into(), value.into());
    self
  }

  pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
    self.cache_time = Some(cache_time);
    self
  }
}

/// Fully defaulted request description.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
  pub method: HttpMethod,
  pub body: Option<Value>,
  pub headers: BTreeMap<String, String>,
  pub cache_time: Duration,
}

impl Default for RequestSpec {
  fn default() -> Self {
    normalize(&FetchOptions::default())
  }
}

/// Fill every missing option with its default.
///
/// A JSON `null` body counts as no body.
pub fn normalize(options: &FetchOptions) -> RequestSpec {
  RequestSpec {
    method: options.method.unwrap_or_default(),
    body: options.body.clone().filter(|body| !body.is_null()),
    headers: options.headers.clone().unwrap_or_default(),
    cache_time: options.cache_time.unwrap_or(DEFAULT_CACHE_TIME),
  }
}

/// Whether a request with this method carries a body.
pub fn should_include_body(method: HttpMethod) -> bool {
  matches!(method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
}

/// Deterministic identity of a request in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Short digest of the key, safe to log.
  pub fn fingerprint(&self) -> String {
    let digest = Sha256::digest(self.0.as_bytes());
    hex::encode(&digest[..8])
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// Build the cache key `METHOD:url:body:headers`.
///
/// Body and headers are serialized as JSON with object keys in sorted order,
/// so field insertion order never affects the key. An absent body is the
/// empty string.
pub fn derive_key(url: &str, spec: &RequestSpec) -> CacheKey {
  let body = spec
    .body
    .as_ref()
    .map(canonical_json)
    .unwrap_or_default();
  let headers = serde_json::to_string(&spec.headers).unwrap_or_default();

  CacheKey(format!("{}:{}:{}:{}", spec.method, url, body, headers))
}

// serde_json stops sorting object keys once any crate enables `preserve_order`
fn canonical_json(value: &Value) -> String {
  fn sorted(value: &Value) -> Value {
    match value {
      Value::Object(map) => {
        let ordered: BTreeMap<&String, Value> =
          map.iter().map(|(k, v)| (k, sorted(v))).collect();
        serde_json::to_value(ordered).unwrap_or(Value::Null)
      }
      Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
      other => other.clone(),
    }
  }

  serde_json::to_string(&sorted(value)).unwrap_or_default()
}
