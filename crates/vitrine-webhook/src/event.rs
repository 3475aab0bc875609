use std::fmt;

/// Lifecycle events announced to webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEvent {
  ProjectCreated,
  ProjectDeleted,
  BuildCreated,
  BuildDeleted,
  BuildUploaded,
  BuildProcessed,
  TagDeleted,
}

impl WebhookEvent {
  pub fn as_str(&self) -> &'static str {
    match self {
      WebhookEvent::ProjectCreated => "project:created",
      WebhookEvent::ProjectDeleted => "project:deleted",
      WebhookEvent::BuildCreated => "build:created",
      WebhookEvent::BuildDeleted => "build:deleted",
      WebhookEvent::BuildUploaded => "build:uploaded",
      WebhookEvent::BuildProcessed => "build:processed",
      WebhookEvent::TagDeleted => "tag:deleted",
    }
  }
}

impl fmt::Display for WebhookEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
