use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The configuration file could not be read.
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// The configuration file is not valid JSON for [`crate::ServiceConfig`].
  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  /// An environment override could not be parsed.
  #[error("invalid value for {var}: '{value}'")]
  InvalidEnv { var: String, value: String },
}
