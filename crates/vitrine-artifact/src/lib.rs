//! Vitrine Artifact
//!
//! This crate provides the blob storage trait and implementations for
//! vitrine. Blobs are files grouped into containers; each project owns
//! exactly one container and every build writes below its own `{buildId}/`
//! prefix, so concurrent work on different builds never collides.
//!
//! The [`BlobStore`] trait uses async streaming for efficient handling of
//! large archives and expanded sites.

mod content;
mod fs;
mod memory;

pub use content::{ByteStream, Content, Download, FileSelector, FileUpload, read_to_bytes};
pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Error type for blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested container or file was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The container already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// A file path escapes its container or is otherwise unusable.
  #[error("invalid path: {0}")]
  InvalidPath(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Blob storage trait.
///
/// Implementations provide the actual storage backend (filesystem, memory,
/// object storage). Paths are `/`-separated and relative to the container.
#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn list_containers(&self) -> Result<Vec<String>, Error>;

  /// Create a container. Fails if it exists.
  async fn create_container(&self, container_id: &str) -> Result<(), Error>;

  /// Delete a container and everything in it.
  async fn delete_container(&self, container_id: &str) -> Result<(), Error>;

  async fn has_container(&self, container_id: &str) -> Result<bool, Error>;

  /// Store files, overwriting existing ones at the same paths.
  async fn upload_files(&self, container_id: &str, files: Vec<FileUpload>) -> Result<(), Error>;

  /// Delete the selected files. Missing files are ignored.
  async fn delete_files(&self, container_id: &str, selector: FileSelector) -> Result<(), Error>;

  async fn has_file(&self, container_id: &str, path: &str) -> Result<bool, Error>;

  /// Retrieve a file as a stream along with its content type.
  async fn download_file(&self, container_id: &str, path: &str) -> Result<Download, Error>;
}

/// Reject paths that are empty, absolute, or climb out of the container.
pub(crate) fn validate_path(path: &str) -> Result<(), Error> {
  let invalid = path.is_empty()
    || path.starts_with('/')
    || path.contains('\\')
    || path.split('/').any(|segment| segment == "..");
  if invalid {
    Err(Error::InvalidPath(path.to_string()))
  } else {
    Ok(())
  }
}

/// Content type for a path, based on its extension.
pub fn content_type_for(path: &str) -> String {
  mime_guess::from_path(path)
    .first_or_octet_stream()
    .essence_str()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_path() {
    assert!(validate_path("b1/primary/index.html").is_ok());
    assert!(validate_path("b1/primary.zip").is_ok());
    assert!(validate_path("").is_err());
    assert!(validate_path("/etc/passwd").is_err());
    assert!(validate_path("b1/../../secret").is_err());
    assert!(validate_path("b1\\x").is_err());
  }

  #[test]
  fn test_content_type_for() {
    assert_eq!(content_type_for("index.html"), "text/html");
    assert_eq!(content_type_for("assets/app.css"), "text/css");
    assert_eq!(content_type_for("index.json"), "application/json");
    assert_eq!(content_type_for("img/logo.png"), "image/png");
    assert_eq!(content_type_for("data.bin.unknownext"), "application/octet-stream");
  }
}
