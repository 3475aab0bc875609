use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use vitrine_config::{HookConfig, WebhookSettings};

use crate::event::WebhookEvent;

/// Per-call dispatch options.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
  /// Only notify the globally configured hooks.
  pub skip_project_hooks: bool,

  /// Overrides the configured per-request timeout.
  pub timeout: Option<Duration>,
}

/// Outcome counts of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
  pub delivered: usize,
  pub failed: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody<'a> {
  event: &'a str,
  project_id: &'a str,
  payload: &'a serde_json::Value,
}

/// Sends lifecycle events to every configured hook.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
  client: Client,
  hooks: Vec<HookConfig>,
  default_timeout: Duration,
}

impl WebhookDispatcher {
  pub fn new(settings: &WebhookSettings) -> Self {
    Self {
      client: Client::new(),
      hooks: settings.hooks.clone(),
      default_timeout: Duration::from_millis(settings.timeout_ms),
    }
  }

  /// A dispatcher with no global hooks.
  pub fn disabled() -> Self {
    Self::new(&WebhookSettings {
      hooks: Vec::new(),
      ..WebhookSettings::default()
    })
  }

  /// Hooks that should receive `event`, global ones first.
  fn targets<'a>(
    &'a self,
    event: WebhookEvent,
    project_hooks: &'a [HookConfig],
    skip_project_hooks: bool,
  ) -> Vec<&'a HookConfig> {
    let project_hooks = if skip_project_hooks {
      &[][..]
    } else {
      project_hooks
    };
    self
      .hooks
      .iter()
      .chain(project_hooks)
      .filter(|hook| hook.accepts(event.as_str()))
      .collect()
  }

  /// Notify every matching hook and wait for all deliveries to settle.
  ///
  /// Never fails; each failed delivery is logged and counted.
  #[instrument(skip(self, project_hooks, payload, options), fields(event = %event))]
  pub async fn dispatch(
    &self,
    event: WebhookEvent,
    project_id: &str,
    project_hooks: &[HookConfig],
    payload: &serde_json::Value,
    options: DispatchOptions,
  ) -> DispatchSummary {
    let targets = self.targets(event, project_hooks, options.skip_project_hooks);
    if targets.is_empty() {
      return DispatchSummary::default();
    }

    let timeout = options.timeout.unwrap_or(self.default_timeout);
    let body = WebhookBody {
      event: event.as_str(),
      project_id,
      payload,
    };

    let deliveries = targets
      .into_iter()
      .map(|hook| self.deliver(hook, event, &body, timeout));

    let mut summary = DispatchSummary::default();
    for delivered in join_all(deliveries).await {
      if delivered {
        summary.delivered += 1;
      } else {
        summary.failed += 1;
      }
    }

    debug!(
      project_id = %project_id,
      delivered = summary.delivered,
      failed = summary.failed,
      "webhook dispatch finished"
    );
    summary
  }

  /// Spawn [`dispatch`](Self::dispatch) and return immediately.
  ///
  /// Must be called from within a tokio runtime.
  pub fn dispatch_detached(
    &self,
    event: WebhookEvent,
    project_id: String,
    project_hooks: Vec<HookConfig>,
    payload: serde_json::Value,
    options: DispatchOptions,
  ) {
    let dispatcher = self.clone();
    tokio::spawn(async move {
      dispatcher
        .dispatch(event, &project_id, &project_hooks, &payload, options)
        .await;
    });
  }

  async fn deliver(
    &self,
    hook: &HookConfig,
    event: WebhookEvent,
    body: &WebhookBody<'_>,
    timeout: Duration,
  ) -> bool {
    let mut request = self
      .client
      .post(&hook.url)
      .timeout(timeout)
      .header("x-webhook-event", event.as_str())
      .json(body);

    for (key, value) in &hook.headers {
      request = request.header(key, value);
    }

    match request.send().await {
      Ok(response) if response.status().is_success() => true,
      Ok(response) => {
        warn!(
          url = %hook.url,
          status = response.status().as_u16(),
          "webhook returned non-success status"
        );
        false
      }
      Err(e) => {
        warn!(
          url = %hook.url,
          timeout = e.is_timeout(),
          error = %e,
          "webhook delivery failed"
        );
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Serve HTTP on a random port, answering every request with `status`
  /// after `delay`. Returns the base URL and a request counter.
  async fn serve(status: u16, delay: Duration) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
      loop {
        let Ok((mut socket, _)) = listener.accept().await else {
          break;
        };
        let counter = counter.clone();
        tokio::spawn(async move {
          let mut buf = vec![0u8; 16 * 1024];
          let _ = socket.read(&mut buf).await;
          counter.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(delay).await;
          let response = format!(
            "HTTP/1.1 {status} OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
          );
          let _ = socket.write_all(response.as_bytes()).await;
        });
      }
    });

    (format!("http://{addr}/hook"), hits)
  }

  fn dispatcher(hooks: Vec<HookConfig>, timeout_ms: u64) -> WebhookDispatcher {
    WebhookDispatcher::new(&WebhookSettings { hooks, timeout_ms })
  }

  #[tokio::test]
  async fn test_timeout_does_not_affect_sibling() {
    let (fast, fast_hits) = serve(200, Duration::ZERO).await;
    let (slow, _) = serve(200, Duration::from_secs(5)).await;
    let dispatcher = dispatcher(vec![HookConfig::new(fast), HookConfig::new(slow)], 200);

    let summary = dispatcher
      .dispatch(
        WebhookEvent::BuildCreated,
        "p1",
        &[],
        &serde_json::json!({"id": "b1"}),
        DispatchOptions::default(),
      )
      .await;

    assert_eq!(summary, DispatchSummary { delivered: 1, failed: 1 });
    assert_eq!(fast_hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_non_success_status_is_counted_as_failure() {
    let (url, hits) = serve(500, Duration::ZERO).await;
    let dispatcher = dispatcher(vec![HookConfig::new(url)], 1000);

    let summary = dispatcher
      .dispatch(
        WebhookEvent::TagDeleted,
        "p1",
        &[],
        &serde_json::Value::Null,
        DispatchOptions::default(),
      )
      .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_unreachable_hook_never_errors() {
    let dispatcher = dispatcher(vec![HookConfig::new("http://127.0.0.1:1/hook")], 500);
    let summary = dispatcher
      .dispatch(
        WebhookEvent::BuildDeleted,
        "p1",
        &[],
        &serde_json::Value::Null,
        DispatchOptions::default(),
      )
      .await;
    assert_eq!(summary, DispatchSummary { delivered: 0, failed: 1 });
  }

  #[tokio::test]
  async fn test_project_hooks_and_filters() {
    let (global, global_hits) = serve(200, Duration::ZERO).await;
    let (project, project_hooks_hits) = serve(200, Duration::ZERO).await;
    let filtered = HookConfig {
      events: Some(vec!["build:processed".to_string()]),
      ..HookConfig::new(global)
    };
    let dispatcher = dispatcher(vec![filtered], 1000);
    let project_hooks = vec![HookConfig::new(project)];

    let summary = dispatcher
      .dispatch(
        WebhookEvent::BuildCreated,
        "p1",
        &project_hooks,
        &serde_json::Value::Null,
        DispatchOptions::default(),
      )
      .await;
    assert_eq!(summary.delivered, 1);
    assert_eq!(global_hits.load(Ordering::SeqCst), 0);
    assert_eq!(project_hooks_hits.load(Ordering::SeqCst), 1);

    let summary = dispatcher
      .dispatch(
        WebhookEvent::ProjectDeleted,
        "p1",
        &project_hooks,
        &serde_json::Value::Null,
        DispatchOptions {
          skip_project_hooks: true,
          ..DispatchOptions::default()
        },
      )
      .await;
    assert_eq!(summary, DispatchSummary::default());
    assert_eq!(project_hooks_hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_event_names() {
    assert_eq!(WebhookEvent::BuildProcessed.as_str(), "build:processed");
    assert_eq!(WebhookEvent::ProjectDeleted.to_string(), "project:deleted");
  }
}
