use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::hook::HookConfig;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
  pub upload: UploadConfig,
  pub purge: PurgeConfig,
  pub webhooks: WebhookSettings,
}

/// Settings for archive ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadConfig {
  /// Archives at or below this size are expanded within the upload call.
  pub inline_threshold_bytes: u64,

  /// Fire a deferred processing trigger for archives above the threshold.
  pub queued_processing: bool,

  /// Base URL of the processing endpoint used by the HTTP trigger.
  /// When unset, deferred processing runs in-process.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub process_base_url: Option<String>,

  /// Number of expanded files uploaded to the blob store at once.
  pub upload_concurrency: usize,
}

impl Default for UploadConfig {
  fn default() -> Self {
    Self {
      inline_threshold_bytes: 5 * MIB,
      queued_processing: false,
      process_base_url: None,
      upload_concurrency: 8,
    }
  }
}

/// Settings for the purge sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PurgeConfig {
  /// Retention applied to projects that do not declare their own.
  pub default_retention_days: u32,

  /// Interval between scheduled sweeps.
  pub interval_secs: u64,
}

impl Default for PurgeConfig {
  fn default() -> Self {
    Self {
      default_retention_days: 30,
      interval_secs: 24 * 60 * 60,
    }
  }
}

/// Globally configured webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookSettings {
  pub hooks: Vec<HookConfig>,
  pub timeout_ms: u64,
}

impl Default for WebhookSettings {
  fn default() -> Self {
    Self {
      hooks: Vec::new(),
      timeout_ms: 5000,
    }
  }
}

impl ServiceConfig {
  /// Load configuration from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// Load from `path` if it exists, otherwise start from defaults. Environment
  /// overrides are applied in both cases.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let mut config = if path.exists() {
      Self::from_file(path)?
    } else {
      debug!(path = %path.display(), "config file not found, using defaults");
      Self::default()
    };
    config.apply_env(|var| std::env::var(var).ok())?;
    Ok(config)
  }

  /// Apply `VITRINE_*` overrides read through `lookup`.
  pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(v) = parse_var(&lookup, "VITRINE_INLINE_THRESHOLD")? {
      self.upload.inline_threshold_bytes = v;
    }
    if let Some(v) = parse_var(&lookup, "VITRINE_QUEUED_PROCESSING")? {
      self.upload.queued_processing = v;
    }
    if let Some(v) = lookup("VITRINE_PROCESS_URL").filter(|v| !v.is_empty()) {
      self.upload.process_base_url = Some(v);
    }
    if let Some(v) = parse_var(&lookup, "VITRINE_DEFAULT_RETENTION_DAYS")? {
      self.purge.default_retention_days = v;
    }
    if let Some(v) = parse_var(&lookup, "VITRINE_PURGE_INTERVAL_SECS")? {
      self.purge.interval_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "VITRINE_WEBHOOK_TIMEOUT_MS")? {
      self.webhooks.timeout_ms = v;
    }
    Ok(())
  }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
  T: FromStr,
  F: Fn(&str) -> Option<String>,
{
  match lookup(var) {
    Some(value) => value
      .trim()
      .parse()
      .map(Some)
      .map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value,
      }),
    None => Ok(None),
  }
}
