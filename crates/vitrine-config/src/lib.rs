//! Vitrine Config
//!
//! This crate contains the serializable configuration types for vitrine.
//! A [`ServiceConfig`] is usually read from `config.json` in the data
//! directory and then adjusted by `VITRINE_*` environment variables.
//!
//! Hook definitions ([`HookConfig`]) live here too because they appear both
//! in the global configuration and on individual project records.

mod error;
mod hook;
mod service;

pub use error::ConfigError;
pub use hook::HookConfig;
pub use service::{MIB, PurgeConfig, ServiceConfig, UploadConfig, WebhookSettings};
