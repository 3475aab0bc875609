//! Shared plumbing injected into every ledger.

use std::convert::Infallible;
use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use vitrine_model::{Document, from_document, to_document};
use vitrine_store::Query;

use crate::context::Context;
use crate::error::CoreError;

pub fn projects_collection() -> &'static str {
  "projects"
}

/// `{projectId}--builds`
pub fn builds_collection(project_id: &str) -> String {
  format!("{project_id}--builds")
}

/// `{projectId}--tags`
pub fn tags_collection(project_id: &str) -> String {
  format!("{project_id}--tags")
}

/// Run a side effect whose failure must not reach the caller.
///
/// The error is logged and swallowed; the `Infallible` error type makes that
/// visible at the call site (`let Ok(()) = best_effort(..).await;`).
pub async fn best_effort<F>(operation: &str, effect: F) -> Result<(), Infallible>
where
  F: Future<Output = Result<(), CoreError>>,
{
  if let Err(e) = effect.await {
    warn!(operation, error = %e, "best-effort operation failed");
  }
  Ok(())
}

/// Typed access to one collection of records.
///
/// Wraps the document store with record encoding, cancellation and logging.
#[derive(Debug, Clone)]
pub struct LedgerHelper {
  record: &'static str,
  collection: String,
}

impl LedgerHelper {
  pub fn new(record: &'static str, collection: impl Into<String>) -> Self {
    Self {
      record,
      collection: collection.into(),
    }
  }

  pub fn collection(&self) -> &str {
    &self.collection
  }

  fn not_found(&self, id: &str) -> CoreError {
    CoreError::NotFound(format!("{} '{id}'", self.record))
  }

  pub async fn list<T: DeserializeOwned>(
    &self,
    ctx: &Context,
    query: &Query,
  ) -> Result<Vec<T>, CoreError> {
    let documents = ctx
      .run(async {
        ctx
          .services
          .documents
          .list_documents(&self.collection, query)
          .await
          .map_err(CoreError::from)
      })
      .await?;

    documents
      .into_iter()
      .map(|doc| from_document(doc).map_err(CoreError::from))
      .collect()
  }

  pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, id: &str) -> Result<T, CoreError> {
    let document = ctx
      .run(async {
        match ctx
          .services
          .documents
          .get_document(&self.collection, id)
          .await
        {
          Ok(doc) => Ok(doc),
          Err(vitrine_store::Error::NotFound(_)) => Err(self.not_found(id)),
          Err(e) => Err(CoreError::from(e)),
        }
      })
      .await?;
    Ok(from_document(document)?)
  }

  pub async fn has(&self, ctx: &Context, id: &str) -> Result<bool, CoreError> {
    ctx
      .run(async {
        ctx
          .services
          .documents
          .has_document(&self.collection, id)
          .await
          .map_err(CoreError::from)
      })
      .await
  }

  /// Store a new record. Fails with `AlreadyExists` if `id` is taken.
  pub async fn insert<T: Serialize>(
    &self,
    ctx: &Context,
    id: &str,
    record: &T,
  ) -> Result<(), CoreError> {
    let document = to_document(record)?;
    ctx
      .run(async {
        match ctx
          .services
          .documents
          .create_document(&self.collection, id, document)
          .await
        {
          Ok(()) => Ok(()),
          Err(vitrine_store::Error::AlreadyExists(_)) => Err(CoreError::AlreadyExists(format!(
            "{} '{id}'",
            self.record
          ))),
          Err(e) => Err(CoreError::from(e)),
        }
      })
      .await?;

    debug!(record = self.record, collection = %self.collection, id = %id, "created");
    Ok(())
  }

  /// Merge `patch` into an existing record.
  pub async fn patch(&self, ctx: &Context, id: &str, patch: Document) -> Result<(), CoreError> {
    ctx
      .run(async {
        match ctx
          .services
          .documents
          .update_document(&self.collection, id, patch)
          .await
        {
          Ok(()) => Ok(()),
          Err(vitrine_store::Error::NotFound(_)) => Err(self.not_found(id)),
          Err(e) => Err(CoreError::from(e)),
        }
      })
      .await?;

    debug!(record = self.record, collection = %self.collection, id = %id, "updated");
    Ok(())
  }

  pub async fn remove(&self, ctx: &Context, id: &str) -> Result<(), CoreError> {
    ctx
      .run(async {
        match ctx
          .services
          .documents
          .delete_document(&self.collection, id)
          .await
        {
          Ok(()) => Ok(()),
          Err(vitrine_store::Error::NotFound(_)) => Err(self.not_found(id)),
          Err(e) => Err(CoreError::from(e)),
        }
      })
      .await?;

    debug!(record = self.record, collection = %self.collection, id = %id, "deleted");
    Ok(())
  }
}

/// Turn a `json!` object literal into a patch document.
pub(crate) fn fields(value: serde_json::Value) -> Document {
  match value {
    serde_json::Value::Object(map) => map,
    _ => Document::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_collection_names() {
    assert_eq!(projects_collection(), "projects");
    assert_eq!(builds_collection("p1"), "p1--builds");
    assert_eq!(tags_collection("p1"), "p1--tags");
  }

  #[tokio::test]
  async fn test_best_effort_swallows_errors() {
    let Ok(()) = best_effort("explode", async { Err::<(), _>(CoreError::NotFound("x".into())) }).await;
    let Ok(()) = best_effort("fine", async { Ok::<_, CoreError>(()) }).await;
  }
}
