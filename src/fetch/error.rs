/// Why a fetch attempt did not produce a payload.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  /// The HTTP client itself failed (DNS, connection, TLS, ...).
  #[error("{0}")]
  Transport(String),
  /// The server answered with a non-success status.
  #[error("HTTP error! status: {0}")]
  Status(u16),
  /// The body claimed to be JSON but did not parse.
  #[error(transparent)]
  Decode(#[from] serde_json::Error),
  /// The attempt was superseded or its subscription torn down.
  #[error("request was cancelled")]
  Cancelled,
}

impl FetchError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport(err.to_string())
  }
}
