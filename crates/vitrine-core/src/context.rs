//! Explicit per-request context and the services it carries.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vitrine_artifact::BlobStore;
use vitrine_config::ServiceConfig;
use vitrine_store::DocumentStore;
use vitrine_webhook::WebhookDispatcher;

use crate::error::CoreError;
use crate::pipeline::{HttpProcessTrigger, LocalProcessTrigger, ProcessTrigger};

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: String,
  pub name: Option<String>,
}

impl User {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: None,
    }
  }

  /// The identity schedulers and background workers act as.
  pub fn system() -> Self {
    Self {
      id: "system".to_string(),
      name: Some("System".to_string()),
    }
  }
}

/// Kinds of access checked against the [`AccessPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  Create,
  Update,
  Delete,
  Upload,
  Process,
  Purge,
}

/// Yes/no authorization contract.
pub trait AccessPolicy: Send + Sync {
  /// `project_id` is `None` for operations not scoped to one project.
  fn is_allowed(&self, user: Option<&User>, project_id: Option<&str>, action: Action) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
  fn is_allowed(&self, _: Option<&User>, _: Option<&str>, _: Action) -> bool {
    true
  }
}

/// Adapters and settings shared by every request.
pub struct Services {
  pub documents: Arc<dyn DocumentStore>,
  pub blobs: Arc<dyn BlobStore>,
  pub webhooks: WebhookDispatcher,
  pub access: Arc<dyn AccessPolicy>,
  pub trigger: Arc<dyn ProcessTrigger>,
  pub config: ServiceConfig,
}

impl Services {
  /// Build services from configuration.
  ///
  /// Deferred processing goes through [`HttpProcessTrigger`] when a process
  /// URL is configured and runs in-process otherwise.
  pub fn new(
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    config: ServiceConfig,
  ) -> Self {
    let trigger: Arc<dyn ProcessTrigger> = match &config.upload.process_base_url {
      Some(base_url) => Arc::new(HttpProcessTrigger::new(base_url.clone())),
      None => Arc::new(LocalProcessTrigger::new(CancellationToken::new())),
    };

    Self {
      documents,
      blobs,
      webhooks: WebhookDispatcher::new(&config.webhooks),
      access: Arc::new(AllowAll),
      trigger,
      config,
    }
  }

  pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
    self.access = access;
    self
  }

  pub fn with_trigger(mut self, trigger: Arc<dyn ProcessTrigger>) -> Self {
    self.trigger = trigger;
    self
  }
}

/// Context of one logical request.
///
/// Cloning is cheap and shares the cancellation token.
#[derive(Clone)]
pub struct Context {
  pub cancel: CancellationToken,
  pub services: Arc<Services>,
  pub user: Option<User>,
  pub locale: Option<String>,
  /// Credentials forwarded to deferred processing calls.
  pub auth_headers: Vec<(String, String)>,
}

impl Context {
  pub fn new(services: Arc<Services>, cancel: CancellationToken) -> Self {
    Self {
      cancel,
      services,
      user: None,
      locale: None,
      auth_headers: Vec::new(),
    }
  }

  /// Context for schedulers and background work.
  pub fn system(services: Arc<Services>, cancel: CancellationToken) -> Self {
    Self::new(services, cancel).with_user(User::system())
  }

  pub fn with_user(mut self, user: User) -> Self {
    self.user = Some(user);
    self
  }

  pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
    self.locale = Some(locale.into());
    self
  }

  pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.auth_headers.push((name.into(), value.into()));
    self
  }

  pub fn services(&self) -> &Services {
    &self.services
  }

  /// Run `operation`, aborting it when the context is cancelled.
  pub async fn run<T, F>(&self, operation: F) -> Result<T, CoreError>
  where
    F: Future<Output = Result<T, CoreError>>,
  {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(CoreError::Cancelled),
      result = operation => result,
    }
  }

  /// Check `action` against the access policy.
  pub fn authorize(&self, project_id: Option<&str>, action: Action) -> Result<(), CoreError> {
    if self
      .services
      .access
      .is_allowed(self.user.as_ref(), project_id, action)
    {
      return Ok(());
    }

    match &self.user {
      None => Err(CoreError::Unauthorized),
      Some(user) => Err(CoreError::Forbidden(format!(
        "user '{}' may not {action:?} in project '{}'",
        user.id,
        project_id.unwrap_or("*")
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use vitrine_artifact::MemoryStore as MemoryBlobs;
  use vitrine_store::MemoryStore as MemoryDocuments;

  struct DenyAll;

  impl AccessPolicy for DenyAll {
    fn is_allowed(&self, _: Option<&User>, _: Option<&str>, _: Action) -> bool {
      false
    }
  }

  fn services() -> Services {
    Services::new(
      Arc::new(MemoryDocuments::new()),
      Arc::new(MemoryBlobs::new()),
      ServiceConfig::default(),
    )
  }

  #[test]
  fn test_authorize_denials() {
    let services = Arc::new(services().with_access(Arc::new(DenyAll)));
    let anonymous = Context::new(services.clone(), CancellationToken::new());
    assert!(matches!(
      anonymous.authorize(Some("p1"), Action::Upload),
      Err(CoreError::Unauthorized)
    ));

    let user = anonymous.with_user(User::new("alice"));
    assert!(matches!(
      user.authorize(Some("p1"), Action::Upload),
      Err(CoreError::Forbidden(_))
    ));
  }

  #[tokio::test]
  async fn test_run_observes_cancellation() {
    let cancel = CancellationToken::new();
    let ctx = Context::new(Arc::new(services()), cancel.clone());

    assert_eq!(ctx.run(async { Ok::<_, CoreError>(1) }).await.unwrap(), 1);

    cancel.cancel();
    let result: Result<(), CoreError> = ctx.run(std::future::pending()).await;
    assert!(matches!(result, Err(CoreError::Cancelled)));
  }
}
