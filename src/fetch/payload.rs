use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
  /// Body served as `application/json`
  Json(Value),
  /// Body served as text, or with an unrecognized content type
  Text(String),
  /// 204 No Content
  Empty,
}

impl Payload {
  pub fn as_json(&self) -> Option<&Value> {
    match self {
      Payload::Json(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Payload::Text(text) => Some(text),
      _ => None,
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Payload::Empty)
  }

  /// Deserialize a JSON payload into a concrete type.
  ///
  /// Text payloads are treated as a JSON string, `Empty` as `null`.
  pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    match self {
      Payload::Json(value) => T::deserialize(value),
      Payload::Text(text) => T::deserialize(Value::String(text.clone())),
      Payload::Empty => T::deserialize(Value::Null),
    }
  }
}
