use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::RwLock;

use crate::content::read_to_bytes;
use crate::{BlobStore, Download, Error, FileSelector, FileUpload, validate_path};

#[derive(Debug, Clone)]
struct StoredFile {
  data: Bytes,
  mime_type: String,
}

/// In-memory blob store.
///
/// Suitable for tests. Uploaded streams are collected into memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  containers: RwLock<BTreeMap<String, BTreeMap<String, StoredFile>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Paths currently stored in a container, in order.
  pub async fn paths(&self, container_id: &str) -> Vec<String> {
    self
      .containers
      .read()
      .await
      .get(container_id)
      .map(|files| files.keys().cloned().collect())
      .unwrap_or_default()
  }
}

fn container_not_found(container_id: &str) -> Error {
  Error::NotFound(format!("container '{container_id}'"))
}

#[async_trait]
impl BlobStore for MemoryStore {
  async fn list_containers(&self) -> Result<Vec<String>, Error> {
    Ok(self.containers.read().await.keys().cloned().collect())
  }

  async fn create_container(&self, container_id: &str) -> Result<(), Error> {
    let mut containers = self.containers.write().await;
    if containers.contains_key(container_id) {
      return Err(Error::AlreadyExists(format!("container '{container_id}'")));
    }
    containers.insert(container_id.to_string(), BTreeMap::new());
    Ok(())
  }

  async fn delete_container(&self, container_id: &str) -> Result<(), Error> {
    self
      .containers
      .write()
      .await
      .remove(container_id)
      .map(|_| ())
      .ok_or_else(|| container_not_found(container_id))
  }

  async fn has_container(&self, container_id: &str) -> Result<bool, Error> {
    Ok(self.containers.read().await.contains_key(container_id))
  }

  async fn upload_files(&self, container_id: &str, files: Vec<FileUpload>) -> Result<(), Error> {
    if !self.has_container(container_id).await? {
      return Err(container_not_found(container_id));
    }

    // Read every stream before taking the write lock.
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
      validate_path(&file.path)?;
      let data = read_to_bytes(file.content.into_stream()).await?;
      stored.push((
        file.path,
        StoredFile {
          data,
          mime_type: file.mime_type,
        },
      ));
    }

    let mut containers = self.containers.write().await;
    let container = containers
      .get_mut(container_id)
      .ok_or_else(|| container_not_found(container_id))?;
    container.extend(stored);
    Ok(())
  }

  async fn delete_files(&self, container_id: &str, selector: FileSelector) -> Result<(), Error> {
    let mut containers = self.containers.write().await;
    let container = containers
      .get_mut(container_id)
      .ok_or_else(|| container_not_found(container_id))?;

    match selector {
      FileSelector::Paths(paths) => {
        for path in paths {
          container.remove(&path);
        }
      }
      FileSelector::Prefix(prefix) => {
        validate_path(&prefix)?;
        container.retain(|path, _| !path.starts_with(&prefix));
      }
    }
    Ok(())
  }

  async fn has_file(&self, container_id: &str, path: &str) -> Result<bool, Error> {
    Ok(
      self
        .containers
        .read()
        .await
        .get(container_id)
        .is_some_and(|files| files.contains_key(path)),
    )
  }

  async fn download_file(&self, container_id: &str, path: &str) -> Result<Download, Error> {
    let containers = self.containers.read().await;
    let file = containers
      .get(container_id)
      .ok_or_else(|| container_not_found(container_id))?
      .get(path)
      .cloned()
      .ok_or_else(|| Error::NotFound(path.to_string()))?;

    let data = file.data;
    Ok(Download {
      content: Box::pin(stream::once(async move { Ok::<_, Error>(data) })),
      mime_type: file.mime_type,
    })
  }
}
