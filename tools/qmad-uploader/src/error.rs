//! Structured error types for the uploader.
//!
//! Only [`ConfigError`] and [`StoreError`] are fatal. [`RemoteError`] is always
//! recovered by the caller and downgraded to "no data".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("environment variable {0} is not set")]
  Missing(&'static str),

  #[error("malformed service account credentials: {0}")]
  Credentials(#[from] serde_json::Error),
}

/// Failures talking to the analysis service.
#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("unauthorized")]
  Unauthorized,

  #[error("unexpected status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("decode: {0}")]
  Decode(String),
}

impl RemoteError {
  pub fn decode(msg: impl Into<String>) -> Self {
    Self::Decode(msg.into())
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("credentials: {0}")]
  Credentials(String),

  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("encode: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("write to {path} rejected with status {status}: {body}")]
  Rejected {
    path: String,
    status: u16,
    body: String,
  },
}

impl StoreError {
  pub fn credentials(msg: impl Into<String>) -> Self {
    Self::Credentials(msg.into())
  }
}

/// Everything that ends the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum UploaderError {
  #[error("configuration: {0}")]
  Config(#[from] ConfigError),

  #[error("store: {0}")]
  Store(#[from] StoreError),
}
