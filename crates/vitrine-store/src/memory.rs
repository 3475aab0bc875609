use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
  Document, DocumentStore, Error, Query, collection_not_found, document_not_found, merge,
};

/// In-memory document store.
///
/// Suitable for tests and single-process experiments. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
  collections: RwLock<BTreeMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn list_collections(&self) -> Result<Vec<String>, Error> {
    Ok(self.collections.read().await.keys().cloned().collect())
  }

  async fn create_collection(&self, collection_id: &str) -> Result<(), Error> {
    let mut collections = self.collections.write().await;
    if collections.contains_key(collection_id) {
      return Err(Error::AlreadyExists(format!("collection '{collection_id}'")));
    }
    collections.insert(collection_id.to_string(), BTreeMap::new());
    Ok(())
  }

  async fn delete_collection(&self, collection_id: &str) -> Result<(), Error> {
    self
      .collections
      .write()
      .await
      .remove(collection_id)
      .map(|_| ())
      .ok_or_else(|| collection_not_found(collection_id))
  }

  async fn has_collection(&self, collection_id: &str) -> Result<bool, Error> {
    Ok(self.collections.read().await.contains_key(collection_id))
  }

  async fn list_documents(
    &self,
    collection_id: &str,
    query: &Query,
  ) -> Result<Vec<Document>, Error> {
    let collections = self.collections.read().await;
    let documents = collections
      .get(collection_id)
      .ok_or_else(|| collection_not_found(collection_id))?;
    Ok(query.apply(documents.values().cloned()))
  }

  async fn create_document(
    &self,
    collection_id: &str,
    id: &str,
    mut document: Document,
  ) -> Result<(), Error> {
    let mut collections = self.collections.write().await;
    let documents = collections
      .get_mut(collection_id)
      .ok_or_else(|| collection_not_found(collection_id))?;
    if documents.contains_key(id) {
      return Err(Error::AlreadyExists(format!(
        "document '{id}' in '{collection_id}'"
      )));
    }
    document.insert("id".to_string(), id.into());
    documents.insert(id.to_string(), document);
    Ok(())
  }

  async fn get_document(&self, collection_id: &str, id: &str) -> Result<Document, Error> {
    let collections = self.collections.read().await;
    collections
      .get(collection_id)
      .ok_or_else(|| collection_not_found(collection_id))?
      .get(id)
      .cloned()
      .ok_or_else(|| document_not_found(collection_id, id))
  }

  async fn has_document(&self, collection_id: &str, id: &str) -> Result<bool, Error> {
    let collections = self.collections.read().await;
    Ok(
      collections
        .get(collection_id)
        .ok_or_else(|| collection_not_found(collection_id))?
        .contains_key(id),
    )
  }

  async fn update_document(
    &self,
    collection_id: &str,
    id: &str,
    patch: Document,
  ) -> Result<(), Error> {
    let mut collections = self.collections.write().await;
    let document = collections
      .get_mut(collection_id)
      .ok_or_else(|| collection_not_found(collection_id))?
      .get_mut(id)
      .ok_or_else(|| document_not_found(collection_id, id))?;
    merge(document, patch);
    Ok(())
  }

  async fn delete_document(&self, collection_id: &str, id: &str) -> Result<(), Error> {
    let mut collections = self.collections.write().await;
    collections
      .get_mut(collection_id)
      .ok_or_else(|| collection_not_found(collection_id))?
      .remove(id)
      .map(|_| ())
      .ok_or_else(|| document_not_found(collection_id, id))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::Filter;

  fn doc(value: serde_json::Value) -> Document {
    value.as_object().unwrap().clone()
  }

  #[tokio::test]
  async fn test_collection_lifecycle() {
    let store = MemoryStore::new();
    assert!(!store.has_collection("builds").await.unwrap());

    store.create_collection("builds").await.unwrap();
    assert!(store.has_collection("builds").await.unwrap());
    assert!(matches!(
      store.create_collection("builds").await,
      Err(Error::AlreadyExists(_))
    ));

    store.delete_collection("builds").await.unwrap();
    assert!(matches!(
      store.delete_collection("builds").await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_create_fails_if_exists() {
    let store = MemoryStore::new();
    store.create_collection("tags").await.unwrap();
    store
      .create_document("tags", "main", doc(json!({"buildsCount": 1})))
      .await
      .unwrap();

    let result = store
      .create_document("tags", "main", doc(json!({"buildsCount": 5})))
      .await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));

    let stored = store.get_document("tags", "main").await.unwrap();
    assert_eq!(stored["buildsCount"], 1);
    assert_eq!(stored["id"], "main");
  }

  #[tokio::test]
  async fn test_update_requires_exists_and_merges() {
    let store = MemoryStore::new();
    store.create_collection("tags").await.unwrap();

    let result = store
      .update_document("tags", "main", doc(json!({"buildsCount": 1})))
      .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    store
      .create_document("tags", "main", doc(json!({"buildsCount": 1, "value": "main"})))
      .await
      .unwrap();
    store
      .update_document("tags", "main", doc(json!({"buildsCount": 2, "id": "other"})))
      .await
      .unwrap();

    let stored = store.get_document("tags", "main").await.unwrap();
    assert_eq!(stored["buildsCount"], 2);
    assert_eq!(stored["value"], "main");
    assert_eq!(stored["id"], "main");
  }

  #[tokio::test]
  async fn test_missing_collection_is_not_found() {
    let store = MemoryStore::new();
    let result = store.list_documents("nope", &Query::new()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    let result = store.create_document("nope", "x", Document::new()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
  }

  #[tokio::test]
  async fn test_list_with_query() {
    let store = MemoryStore::new();
    store.create_collection("builds").await.unwrap();
    for (id, at) in [("a", 1), ("b", 2), ("c", 3)] {
      store
        .create_document("builds", id, doc(json!({"updatedAt": at})))
        .await
        .unwrap();
    }

    let query = Query::new().filter(Filter::gt("updatedAt", 1)).sort_desc("updatedAt");
    let result = store.list_documents("builds", &query).await.unwrap();
    let ids: Vec<_> = result.iter().map(|d| d["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["c", "b"]);
  }
}
