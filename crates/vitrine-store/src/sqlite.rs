use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
  Document, DocumentStore, Error, Query, collection_not_found, document_not_found, merge,
};

/// SQLite-based document store.
///
/// Every document is kept as a JSON text blob in a single `documents`
/// table keyed by `(collection_id, id)`. Queries are evaluated in process
/// after loading the collection.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  async fn ensure_collection(&self, collection_id: &str) -> Result<(), Error> {
    if self.has_collection(collection_id).await? {
      Ok(())
    } else {
      Err(collection_not_found(collection_id))
    }
  }

  async fn fetch_data(
    tx: &mut Transaction<'_, Sqlite>,
    collection_id: &str,
    id: &str,
  ) -> Result<Option<String>, Error> {
    Ok(
      sqlx::query_scalar("SELECT data FROM documents WHERE collection_id = ? AND id = ?")
        .bind(collection_id)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?,
    )
  }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
  matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn decode(data: &str) -> Result<Document, Error> {
  Ok(serde_json::from_str(data)?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
  async fn list_collections(&self) -> Result<Vec<String>, Error> {
    Ok(
      sqlx::query_scalar("SELECT id FROM collections ORDER BY id")
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn create_collection(&self, collection_id: &str) -> Result<(), Error> {
    sqlx::query("INSERT INTO collections (id) VALUES (?)")
      .bind(collection_id)
      .execute(&self.pool)
      .await
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::AlreadyExists(format!("collection '{collection_id}'"))
        } else {
          Error::Database(e)
        }
      })?;
    Ok(())
  }

  async fn delete_collection(&self, collection_id: &str) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    sqlx::query("DELETE FROM documents WHERE collection_id = ?")
      .bind(collection_id)
      .execute(&mut *tx)
      .await?;

    let deleted = sqlx::query("DELETE FROM collections WHERE id = ?")
      .bind(collection_id)
      .execute(&mut *tx)
      .await?
      .rows_affected();

    if deleted == 0 {
      return Err(collection_not_found(collection_id));
    }

    tx.commit().await?;
    Ok(())
  }

  async fn has_collection(&self, collection_id: &str) -> Result<bool, Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE id = ?")
      .bind(collection_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(count > 0)
  }

  async fn list_documents(
    &self,
    collection_id: &str,
    query: &Query,
  ) -> Result<Vec<Document>, Error> {
    self.ensure_collection(collection_id).await?;

    let rows: Vec<String> = sqlx::query_scalar("SELECT data FROM documents WHERE collection_id = ?")
      .bind(collection_id)
      .fetch_all(&self.pool)
      .await?;

    let documents = rows
      .iter()
      .map(|data| decode(data))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(query.apply(documents))
  }

  async fn create_document(
    &self,
    collection_id: &str,
    id: &str,
    mut document: Document,
  ) -> Result<(), Error> {
    self.ensure_collection(collection_id).await?;
    document.insert("id".to_string(), id.into());
    let data = serde_json::to_string(&document)?;

    sqlx::query("INSERT INTO documents (collection_id, id, data) VALUES (?, ?, ?)")
      .bind(collection_id)
      .bind(id)
      .bind(data)
      .execute(&self.pool)
      .await
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::AlreadyExists(format!("document '{id}' in '{collection_id}'"))
        } else {
          Error::Database(e)
        }
      })?;
    Ok(())
  }

  async fn get_document(&self, collection_id: &str, id: &str) -> Result<Document, Error> {
    self.ensure_collection(collection_id).await?;

    let data: Option<String> =
      sqlx::query_scalar("SELECT data FROM documents WHERE collection_id = ? AND id = ?")
        .bind(collection_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

    match data {
      Some(data) => decode(&data),
      None => Err(document_not_found(collection_id, id)),
    }
  }

  async fn has_document(&self, collection_id: &str, id: &str) -> Result<bool, Error> {
    self.ensure_collection(collection_id).await?;

    let count: i64 =
      sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection_id = ? AND id = ?")
        .bind(collection_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
    Ok(count > 0)
  }

  async fn update_document(
    &self,
    collection_id: &str,
    id: &str,
    patch: Document,
  ) -> Result<(), Error> {
    self.ensure_collection(collection_id).await?;
    let mut tx = self.pool.begin().await?;

    let data = Self::fetch_data(&mut tx, collection_id, id)
      .await?
      .ok_or_else(|| document_not_found(collection_id, id))?;
    let mut document = decode(&data)?;
    merge(&mut document, patch);

    sqlx::query("UPDATE documents SET data = ? WHERE collection_id = ? AND id = ?")
      .bind(serde_json::to_string(&document)?)
      .bind(collection_id)
      .bind(id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn delete_document(&self, collection_id: &str, id: &str) -> Result<(), Error> {
    self.ensure_collection(collection_id).await?;

    let deleted = sqlx::query("DELETE FROM documents WHERE collection_id = ? AND id = ?")
      .bind(collection_id)
      .bind(id)
      .execute(&self.pool)
      .await?
      .rows_affected();

    if deleted == 0 {
      Err(document_not_found(collection_id, id))
    } else {
      Ok(())
    }
  }
}
