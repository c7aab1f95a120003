//! Error kinds for backend round-trips.
//!
//! Application-level code uses `color_eyre::Result`; the API layer returns
//! [`ApiError`] so callers can tell an expired session from a flaky network.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// Missing or rejected bearer token
  #[error("not authenticated")]
  Unauthorized,

  /// Connection refused, DNS failure, timeout
  #[error("network error: {0}")]
  Transport(String),

  /// Request was rejected before it left the client
  #[error("{0}")]
  Validation(String),

  /// The backend already has this account registered
  #[error("already connected as {name}")]
  AlreadyConnected { name: String },

  /// Any other non-success status
  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },

  /// Response body did not match the expected shape
  #[error("unexpected response: {0}")]
  Decode(String),
}

impl ApiError {
  /// Whether the session should be sent back to login.
  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Unauthorized)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      return ApiError::Decode(err.to_string());
    }
    if let Some(status) = err.status() {
      if status == reqwest::StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
      }
      return ApiError::Status {
        status: status.as_u16(),
        message: err.to_string(),
      };
    }
    ApiError::Transport(err.to_string())
  }
}

impl From<crate::validation::ValidationError> for ApiError {
  fn from(err: crate::validation::ValidationError) -> Self {
    ApiError::Validation(err.to_string())
  }
}
