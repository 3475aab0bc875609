//! Vitrine Store
//!
//! This crate provides the document storage trait and implementations used
//! by the vitrine ledgers. Documents are flat key/value records keyed by a
//! string `id` and grouped into collections.
//!
//! The [`DocumentStore`] trait mirrors the contract every backend has to
//! honour:
//! - creating a document fails if the id already exists
//! - updating a document requires it to exist and merges the given fields
//! - operations on a missing collection fail with [`Error::NotFound`]
//!
//! Filtering, sorting and limits are described by a [`Query`] and evaluated
//! the same way by every backend.

mod memory;
mod query;
mod sqlite;

pub use memory::MemoryStore;
pub use query::{Filter, Query, Sort};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

/// A flat key/value record.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Error type for document storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested collection or document was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A collection or document with the same id already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// A stored document could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Document storage trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// List collection ids.
  async fn list_collections(&self) -> Result<Vec<String>, Error>;

  /// Create an empty collection. Fails if it exists.
  async fn create_collection(&self, collection_id: &str) -> Result<(), Error>;

  /// Delete a collection and every document in it.
  async fn delete_collection(&self, collection_id: &str) -> Result<(), Error>;

  async fn has_collection(&self, collection_id: &str) -> Result<bool, Error>;

  /// List documents of a collection matching `query`.
  async fn list_documents(&self, collection_id: &str, query: &Query)
  -> Result<Vec<Document>, Error>;

  /// Store a new document under `id`. Fails if `id` is taken.
  async fn create_document(
    &self,
    collection_id: &str,
    id: &str,
    document: Document,
  ) -> Result<(), Error>;

  async fn get_document(&self, collection_id: &str, id: &str) -> Result<Document, Error>;

  async fn has_document(&self, collection_id: &str, id: &str) -> Result<bool, Error>;

  /// Merge `patch` into an existing document.
  async fn update_document(&self, collection_id: &str, id: &str, patch: Document)
  -> Result<(), Error>;

  async fn delete_document(&self, collection_id: &str, id: &str) -> Result<(), Error>;
}

pub(crate) fn collection_not_found(collection_id: &str) -> Error {
  Error::NotFound(format!("collection '{collection_id}'"))
}

pub(crate) fn document_not_found(collection_id: &str, id: &str) -> Error {
  Error::NotFound(format!("document '{id}' in '{collection_id}'"))
}

/// Apply `patch` on top of `document`, keeping the stored id.
pub(crate) fn merge(document: &mut Document, patch: Document) {
  for (key, value) in patch {
    if key != "id" {
      document.insert(key, value);
    }
  }
}
