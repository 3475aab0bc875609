use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vitrine_model::Variant;

use crate::context::{Context, Services};
use crate::error::CoreError;
use crate::pipeline::decompress::process_variant;

/// A deferred request to expand one build variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
  pub project_id: String,
  pub build_id: String,
  pub variant: Variant,
  /// Credentials of the originating request.
  pub auth_headers: Vec<(String, String)>,
}

/// Submits processing without waiting for it.
///
/// There is no result channel; implementations log their own failures.
pub trait ProcessTrigger: Send + Sync {
  fn fire(&self, services: Arc<Services>, request: ProcessRequest);
}

/// Time allowed for the processing endpoint to accept a request.
pub const TRIGGER_TIMEOUT: Duration = Duration::from_secs(10);

/// Calls the processing endpoint of a vitrine service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProcessTrigger {
  client: Client,
  base_url: String,
  timeout: Duration,
}

impl HttpProcessTrigger {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      base_url: base_url.into(),
      timeout: TRIGGER_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// `{base}/projects/{projectId}/builds/{buildId}/process?variant={variant}`
  /// with the ids percent-encoded as path segments.
  pub fn url(&self, request: &ProcessRequest) -> Result<Url, CoreError> {
    let mut url = Url::parse(&self.base_url)
      .map_err(|e| CoreError::InvalidInput(format!("invalid process url '{}': {e}", self.base_url)))?;
    url
      .path_segments_mut()
      .map_err(|()| CoreError::InvalidInput(format!("process url '{}' cannot be a base", self.base_url)))?
      .pop_if_empty()
      .extend([
        "projects",
        request.project_id.as_str(),
        "builds",
        request.build_id.as_str(),
        "process",
      ]);
    url
      .query_pairs_mut()
      .append_pair("variant", request.variant.as_str());
    Ok(url)
  }
}

impl ProcessTrigger for HttpProcessTrigger {
  fn fire(&self, _services: Arc<Services>, request: ProcessRequest) {
    let url = match self.url(&request) {
      Ok(url) => url,
      Err(e) => {
        warn!(build_id = %request.build_id, error = %e, "process trigger skipped");
        return;
      }
    };
    let mut call = self.client.post(url.clone()).timeout(self.timeout);
    for (name, value) in &request.auth_headers {
      call = call.header(name, value);
    }

    tokio::spawn(async move {
      match call.send().await {
        Ok(response) if response.status().is_success() => {
          debug!(url = %url, "process trigger accepted");
        }
        Ok(response) => {
          warn!(url = %url, status = response.status().as_u16(), "process trigger rejected");
        }
        Err(e) => {
          warn!(url = %url, error = %e, "process trigger failed");
        }
      }
    });
  }
}

/// Runs the decompression worker on the local runtime.
///
/// Spawned work is cancelled together with the token given at construction.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessTrigger {
  cancel: CancellationToken,
}

impl LocalProcessTrigger {
  pub fn new(cancel: CancellationToken) -> Self {
    Self { cancel }
  }
}

impl ProcessTrigger for LocalProcessTrigger {
  fn fire(&self, services: Arc<Services>, request: ProcessRequest) {
    let ProcessRequest {
      project_id,
      build_id,
      variant,
      auth_headers,
    } = request;
    let mut ctx = Context::system(services, self.cancel.child_token());
    ctx.auth_headers = auth_headers;

    tokio::spawn(async move {
      match process_variant(&ctx, &project_id, &build_id, variant).await {
        Ok(_) => info!(
          project_id = %project_id,
          build_id = %build_id,
          variant = %variant,
          "deferred processing finished"
        ),
        Err(e) => warn!(
          project_id = %project_id,
          build_id = %build_id,
          variant = %variant,
          error = %e,
          "deferred processing failed"
        ),
      }
    });
  }
}
