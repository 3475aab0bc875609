use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An HTTP endpoint notified on lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
  /// Target URL. Receives a `POST` with a JSON body.
  pub url: String,

  /// Event allow-list (e.g. `build:created`). `None` means every event.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub events: Option<Vec<String>>,

  /// Extra headers sent with every request.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub headers: HashMap<String, String>,
}

impl HookConfig {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      events: None,
      headers: HashMap::new(),
    }
  }

  /// Whether this hook wants to receive `event`.
  pub fn accepts(&self, event: &str) -> bool {
    match &self.events {
      Some(events) => events.iter().any(|e| e == event),
      None => true,
    }
  }
}
