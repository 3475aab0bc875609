use thiserror::Error;

/// Errors raised while decoding or validating domain records.
#[derive(Debug, Error)]
pub enum ModelError {
  /// A stored document does not match the expected record shape.
  #[error("invalid document: {0}")]
  Codec(#[from] serde_json::Error),

  /// The variant name is not one of the known artifact kinds.
  #[error("unsupported variant: {value}")]
  UnsupportedVariant { value: String },

  /// The tag type is not one of `branch`, `pr`, `ticket`.
  #[error("unsupported tag type: {value}")]
  UnsupportedTagType { value: String },

  /// A story manifest could not be understood.
  #[error("invalid story manifest: {message}")]
  InvalidManifest { message: String },
}
