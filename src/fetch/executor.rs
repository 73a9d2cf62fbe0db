//! Request execution and response decoding.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::FetchError;
use super::payload::Payload;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::request::{should_include_body, RequestSpec};

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Performs a single cancellable fetch through a transport.
#[derive(Clone)]
pub struct FetchExecutor {
  transport: Arc<dyn HttpTransport>,
}

impl FetchExecutor {
  pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
    Self { transport }
  }

  /// Fetch `url` and decode the body.
  ///
  /// Resolves to `FetchError::Cancelled` as soon as `token` fires, whether
  /// the request is still in flight or its body is being read.
  pub async fn execute(
    &self,
    url: &str,
    spec: &RequestSpec,
    token: &CancellationToken,
  ) -> Result<Payload, FetchError> {
    let request = build_request(url, spec)?;

    tokio::select! {
      biased;
      _ = token.cancelled() => {
        debug!(url, "Fetch cancelled");
        Err(FetchError::Cancelled)
      }
      response = self.transport.send(request) => decode_response(response?),
    }
  }
}

/// Build the outgoing request for a normalized spec.
///
/// `Content-Type: application/json` is always sent unless the spec sets its
/// own (matched case-insensitively). The body is attached only for POST, PUT
/// and PATCH.
pub fn build_request(url: &str, spec: &RequestSpec) -> Result<HttpRequest, FetchError> {
  let mut headers = BTreeMap::new();
  if !spec
    .headers
    .keys()
    .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE))
  {
    headers.insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
  }
  headers.extend(spec.headers.clone());

  let body = match &spec.body {
    Some(body) if should_include_body(spec.method) => Some(serde_json::to_string(body)?),
    _ => None,
  };

  Ok(HttpRequest {
    method: spec.method,
    url: url.to_string(),
    headers,
    body,
  })
}

/// Turn a response into a payload.
///
/// JSON content types are parsed, `text/` types returned as text. Anything
/// else is text too, except a 204 which has no content.
pub fn decode_response(response: HttpResponse) -> Result<Payload, FetchError> {
  if !response.is_success() {
    return Err(FetchError::Status(response.status));
  }

  let content_type = response
    .content_type
    .as_deref()
    .map(str::to_ascii_lowercase)
    .unwrap_or_default();

  if content_type.contains(APPLICATION_JSON) {
    Ok(Payload::Json(serde_json::from_slice(&response.body)?))
  } else if content_type.contains("text/") || response.status != 204 {
    Ok(Payload::Text(
      String::from_utf8_lossy(&response.body).into_owned(),
    ))
  } else {
    Ok(Payload::Empty)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::{normalize, FetchOptions, HttpMethod};
  use crate::testing::{Reply, ScriptedTransport};
  use serde_json::json;
  use std::time::Duration;

  #[test]
  fn test_default_content_type_header() {
    let request = build_request("/api", &RequestSpec::default()).unwrap();
    assert_eq!(
      request.headers.get("Content-Type").map(String::as_str),
      Some("application/json")
    );
    assert_eq!(request.method, HttpMethod::Get);
  }

  #[test]
  fn test_spec_headers_win() {
    let spec = normalize(
      &FetchOptions::new()
        .with_header("content-type", "text/plain")
        .with_header("Authorization", "Bearer token"),
    );
    let request = build_request("/api", &spec).unwrap();

    assert_eq!(request.headers.len(), 2);
    assert_eq!(
      request.headers.get("content-type").map(String::as_str),
      Some("text/plain")
    );
    assert!(!request.headers.contains_key("Content-Type"));
  }

  #[test]
  fn test_body_only_for_body_methods() {
    let body = json!({"name": "New User", "email": "new@example.com"});

    let post = normalize(
      &FetchOptions::new()
        .with_method(HttpMethod::Post)
        .with_body(body.clone()),
    );
    let request = build_request("/api/users", &post).unwrap();
    assert_eq!(request.body, Some(body.to_string()));

    let get = normalize(&FetchOptions::new().with_body(body));
    assert_eq!(build_request("/api/users", &get).unwrap().body, None);
  }

  #[test]
  fn test_decode_json() {
    let response = HttpResponse::new(200, Some("application/json; charset=utf-8"), r#"{"id":1}"#);
    assert_eq!(decode_response(response).unwrap(), Payload::Json(json!({"id": 1})));
  }

  #[test]
  fn test_decode_text() {
    let response = HttpResponse::new(200, Some("text/html"), "<p>hi</p>");
    assert_eq!(
      decode_response(response).unwrap(),
      Payload::Text("<p>hi</p>".into())
    );
  }

  #[test]
  fn test_decode_no_content() {
    let response = HttpResponse::new(204, None, "");
    assert_eq!(decode_response(response).unwrap(), Payload::Empty);
  }

  #[test]
  fn test_decode_unknown_type_as_text() {
    let response = HttpResponse::new(200, Some("application/octet-stream"), "raw");
    assert_eq!(decode_response(response).unwrap(), Payload::Text("raw".into()));
  }

  #[test]
  fn test_decode_text_204_is_text() {
    let response = HttpResponse::new(204, Some("text/plain"), "");
    assert_eq!(decode_response(response).unwrap(), Payload::Text(String::new()));
  }

  #[test]
  fn test_status_error() {
    let response = HttpResponse::new(404, Some("application/json"), "{}");
    let err = decode_response(response).unwrap_err();
    assert_eq!(err.to_string(), "HTTP error! status: 404");
  }

  #[test]
  fn test_malformed_json_is_decode_error() {
    let response = HttpResponse::new(200, Some("application/json"), "{not json");
    assert!(matches!(
      decode_response(response),
      Err(FetchError::Decode(_))
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_execute_sends_request() {
    let transport = Arc::new(ScriptedTransport::new([Reply::json(json!({"ok": true}))]));
    let executor = FetchExecutor::new(transport.clone());

    let payload = executor
      .execute("/api", &RequestSpec::default(), &CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(payload, Payload::Json(json!({"ok": true})));
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.requests()[0].url, "/api");
  }

  #[tokio::test(start_paused = true)]
  async fn test_execute_transport_failure() {
    let transport = Arc::new(ScriptedTransport::new([Reply::fail("Network error")]));
    let executor = FetchExecutor::new(transport);

    let err = executor
      .execute("/api", &RequestSpec::default(), &CancellationToken::new())
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "Network error");
  }

  #[tokio::test(start_paused = true)]
  async fn test_execute_cancelled() {
    let transport = Arc::new(ScriptedTransport::new([
      Reply::json(json!(1)).after(Duration::from_secs(10))
    ]));
    let executor = FetchExecutor::new(transport);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_secs(1)).await;
      canceller.cancel();
    });

    let err = executor
      .execute("/api", &RequestSpec::default(), &token)
      .await
      .unwrap_err();
    assert!(err.is_cancelled());
  }
}
