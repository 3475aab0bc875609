//! Vitrine Webhook
//!
//! Fire-and-forget notification of HTTP endpoints on lifecycle events.
//!
//! Hooks come from two places: the global [`WebhookSettings`] and the hooks a
//! project registers for itself. Every matching hook receives a `POST` with
//! the header `x-webhook-event` and a JSON body `{event, projectId, payload}`.
//! Deliveries run concurrently and failures never reach the caller.

mod dispatcher;
mod event;

pub use dispatcher::{DispatchOptions, DispatchSummary, WebhookDispatcher};
pub use event::WebhookEvent;

pub use vitrine_config::{HookConfig, WebhookSettings};
