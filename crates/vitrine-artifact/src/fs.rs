use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{
  BlobStore, ByteStream, Download, Error, FileSelector, FileUpload, content_type_for,
  validate_path,
};

/// Filesystem-based blob store.
///
/// Each container is a directory below the base path and each file is stored
/// at `{base_path}/{container}/{path}`. Parent directories are created
/// automatically. Content types are derived from file extensions.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn container_dir(&self, container_id: &str) -> Result<PathBuf, Error> {
    if container_id.contains('/') {
      return Err(Error::InvalidPath(container_id.to_string()));
    }
    validate_path(container_id)?;
    Ok(self.base_path.join(container_id))
  }

  async fn existing_container_dir(&self, container_id: &str) -> Result<PathBuf, Error> {
    let dir = self.container_dir(container_id)?;
    if fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
      Ok(dir)
    } else {
      Err(Error::NotFound(format!("container '{container_id}'")))
    }
  }

  fn file_path(container_dir: &Path, path: &str) -> Result<PathBuf, Error> {
    validate_path(path)?;
    Ok(container_dir.join(path))
  }

  async fn write_file(path: &Path, data: ByteStream) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(path).await?;
    let mut stream = std::pin::pin!(data);

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await?;
    }

    file.flush().await?;
    Ok(())
  }
}

fn not_found_as(key: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
  move |e| {
    if e.kind() == ErrorKind::NotFound {
      Error::NotFound(key.to_string())
    } else {
      Error::Io(e)
    }
  }
}

async fn remove_file_if_exists(path: &Path) -> Result<(), Error> {
  match fs::remove_file(path).await {
    Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::Io(e)),
    _ => Ok(()),
  }
}

/// Recursively list files below `dir` as `/`-separated paths relative to `root`.
async fn walk(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<(), std::io::Error> {
  let mut entries = match fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };

  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if entry.file_type().await?.is_dir() {
      Box::pin(walk(root, &path, files)).await?;
    } else if let Ok(relative) = path.strip_prefix(root) {
      let relative: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
      files.push(relative.join("/"));
    }
  }

  Ok(())
}

#[async_trait]
impl BlobStore for FsStore {
  async fn list_containers(&self) -> Result<Vec<String>, Error> {
    let mut containers = Vec::new();
    let mut entries = match fs::read_dir(&self.base_path).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(containers),
      Err(e) => return Err(Error::Io(e)),
    };

    while let Some(entry) = entries.next_entry().await? {
      if entry.file_type().await?.is_dir()
        && let Some(name) = entry.file_name().to_str()
      {
        containers.push(name.to_string());
      }
    }

    containers.sort();
    Ok(containers)
  }

  async fn create_container(&self, container_id: &str) -> Result<(), Error> {
    let dir = self.container_dir(container_id)?;
    if fs::try_exists(&dir).await? {
      return Err(Error::AlreadyExists(format!("container '{container_id}'")));
    }
    fs::create_dir_all(&dir).await?;
    Ok(())
  }

  async fn delete_container(&self, container_id: &str) -> Result<(), Error> {
    let dir = self.container_dir(container_id)?;
    fs::remove_dir_all(&dir)
      .await
      .map_err(not_found_as(container_id))
  }

  async fn has_container(&self, container_id: &str) -> Result<bool, Error> {
    let dir = self.container_dir(container_id)?;
    Ok(fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false))
  }

  async fn upload_files(&self, container_id: &str, files: Vec<FileUpload>) -> Result<(), Error> {
    let dir = self.existing_container_dir(container_id).await?;
    for file in files {
      let path = Self::file_path(&dir, &file.path)?;
      Self::write_file(&path, file.content.into_stream()).await?;
    }
    Ok(())
  }

  async fn delete_files(&self, container_id: &str, selector: FileSelector) -> Result<(), Error> {
    let dir = self.existing_container_dir(container_id).await?;

    match selector {
      FileSelector::Paths(paths) => {
        for path in paths {
          remove_file_if_exists(&Self::file_path(&dir, &path)?).await?;
        }
      }
      FileSelector::Prefix(prefix) => {
        validate_path(&prefix)?;

        let mut files = Vec::new();
        walk(&dir, &dir, &mut files).await?;
        for relative in files.iter().filter(|f| f.starts_with(&prefix)) {
          remove_file_if_exists(&dir.join(relative)).await?;
        }

        // Drop the now-empty directory tree of a `dir/` prefix.
        if let Some(sub) = prefix.strip_suffix('/') {
          match fs::remove_dir_all(dir.join(sub)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(Error::Io(e)),
            _ => {}
          }
        }
      }
    }

    Ok(())
  }

  async fn has_file(&self, container_id: &str, path: &str) -> Result<bool, Error> {
    let dir = self.container_dir(container_id)?;
    let path = Self::file_path(&dir, path)?;
    Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
  }

  async fn download_file(&self, container_id: &str, path: &str) -> Result<Download, Error> {
    let dir = self.container_dir(container_id)?;
    let file_path = Self::file_path(&dir, path)?;
    let file = File::open(&file_path)
      .await
      .map_err(not_found_as(path))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));

    Ok(Download {
      content: Box::pin(stream),
      mime_type: content_type_for(path),
    })
  }
}
