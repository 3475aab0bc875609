//! Core error types.

use serde::Serialize;
use tracing::error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("already exists: {0}")]
  AlreadyExists(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A variant state transition that the state machine does not allow.
  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("unsupported variant: {0}")]
  UnsupportedVariant(String),

  /// The record may not be deleted, e.g. the default-branch tag.
  #[error("protected: {0}")]
  Protected(String),

  #[error("unsupported media type: {0}")]
  UnsupportedMediaType(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("operation cancelled")]
  Cancelled,

  /// Unexpected adapter or runtime failure.
  #[error("internal error: {message}")]
  Internal {
    message: String,
    #[source]
    source: BoxError,
  },
}

impl CoreError {
  pub fn internal(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
    CoreError::Internal {
      message: message.into(),
      source: source.into(),
    }
  }

  /// HTTP status code for this error.
  pub fn status(&self) -> u16 {
    match self {
      CoreError::NotFound(_) => 404,
      CoreError::AlreadyExists(_) => 409,
      CoreError::InvalidInput(_) => 400,
      CoreError::InvalidState(_) => 400,
      CoreError::UnsupportedVariant(_) => 400,
      CoreError::Protected(_) => 409,
      CoreError::UnsupportedMediaType(_) => 415,
      CoreError::Unauthorized => 401,
      CoreError::Forbidden(_) => 403,
      CoreError::Cancelled => 499,
      CoreError::Internal { .. } => 500,
    }
  }

  /// Machine-readable error type.
  pub fn error_type(&self) -> &'static str {
    match self {
      CoreError::NotFound(_) => "NotFound",
      CoreError::AlreadyExists(_) => "AlreadyExists",
      CoreError::InvalidInput(_) => "InvalidInput",
      CoreError::InvalidState(_) => "InvalidState",
      CoreError::UnsupportedVariant(_) => "UnsupportedVariant",
      CoreError::Protected(_) => "Protected",
      CoreError::UnsupportedMediaType(_) => "UnsupportedMediaType",
      CoreError::Unauthorized => "Unauthorized",
      CoreError::Forbidden(_) => "Forbidden",
      CoreError::Cancelled => "Cancelled",
      CoreError::Internal { .. } => "Internal",
    }
  }
}

/// Structured error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
  pub error_type: String,
  pub message: String,
  pub status: u16,
}

impl From<&CoreError> for ErrorResponse {
  fn from(err: &CoreError) -> Self {
    let message = match err {
      CoreError::Internal { message, source } => {
        error!(message = %message, error = %source, "internal error");
        "internal error".to_string()
      }
      other => other.to_string(),
    };

    Self {
      error_type: err.error_type().to_string(),
      message,
      status: err.status(),
    }
  }
}

impl From<vitrine_store::Error> for CoreError {
  fn from(err: vitrine_store::Error) -> Self {
    match err {
      vitrine_store::Error::NotFound(what) => CoreError::NotFound(what),
      vitrine_store::Error::AlreadyExists(what) => CoreError::AlreadyExists(what),
      other => CoreError::internal("document store", other),
    }
  }
}

impl From<vitrine_artifact::Error> for CoreError {
  fn from(err: vitrine_artifact::Error) -> Self {
    match err {
      vitrine_artifact::Error::NotFound(what) => CoreError::NotFound(what),
      vitrine_artifact::Error::AlreadyExists(what) => CoreError::AlreadyExists(what),
      vitrine_artifact::Error::InvalidPath(path) => {
        CoreError::InvalidInput(format!("invalid path: {path}"))
      }
      other => CoreError::internal("blob store", other),
    }
  }
}

impl From<vitrine_model::ModelError> for CoreError {
  fn from(err: vitrine_model::ModelError) -> Self {
    use vitrine_model::ModelError;
    match err {
      ModelError::UnsupportedVariant { value } => CoreError::UnsupportedVariant(value),
      ModelError::UnsupportedTagType { value } => {
        CoreError::InvalidInput(format!("unsupported tag type: {value}"))
      }
      ModelError::InvalidManifest { message } => CoreError::InvalidInput(message),
      other => CoreError::internal("record codec", other),
    }
  }
}

impl From<std::io::Error> for CoreError {
  fn from(err: std::io::Error) -> Self {
    CoreError::internal("io", err)
  }
}

impl From<multer::Error> for CoreError {
  fn from(err: multer::Error) -> Self {
    CoreError::InvalidInput(format!("malformed multipart body: {err}"))
  }
}
