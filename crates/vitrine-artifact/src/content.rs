use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};

use crate::Error;

/// A boxed stream of bytes for blob data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// File content handed to the store.
pub enum Content {
  Stream(ByteStream),
  Bytes(Bytes),
  Text(String),
}

impl Content {
  pub fn into_stream(self) -> ByteStream {
    match self {
      Content::Stream(stream) => stream,
      Content::Bytes(bytes) => Box::pin(stream::once(async move { Ok::<_, Error>(bytes) })),
      Content::Text(text) => Box::pin(stream::once(async move { Ok::<_, Error>(Bytes::from(text)) })),
    }
  }
}

impl From<ByteStream> for Content {
  fn from(stream: ByteStream) -> Self {
    Content::Stream(stream)
  }
}

impl From<Bytes> for Content {
  fn from(bytes: Bytes) -> Self {
    Content::Bytes(bytes)
  }
}

impl From<Vec<u8>> for Content {
  fn from(bytes: Vec<u8>) -> Self {
    Content::Bytes(Bytes::from(bytes))
  }
}

impl From<String> for Content {
  fn from(text: String) -> Self {
    Content::Text(text)
  }
}

impl From<&str> for Content {
  fn from(text: &str) -> Self {
    Content::Text(text.to_string())
  }
}

/// One file to store.
pub struct FileUpload {
  pub path: String,
  pub content: Content,
  pub mime_type: String,
}

impl FileUpload {
  pub fn new(path: impl Into<String>, content: impl Into<Content>, mime_type: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      content: content.into(),
      mime_type: mime_type.into(),
    }
  }
}

/// Which files a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
  Paths(Vec<String>),
  /// Every file whose path starts with the prefix.
  Prefix(String),
}

/// A downloaded file.
pub struct Download {
  pub content: ByteStream,
  pub mime_type: String,
}

impl Download {
  /// Collect the whole stream into memory.
  pub async fn bytes(self) -> Result<Bytes, Error> {
    read_to_bytes(self.content).await
  }
}

/// Collect a byte stream into a single buffer.
pub async fn read_to_bytes(mut stream: ByteStream) -> Result<Bytes, Error> {
  let mut buffer = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buffer.extend_from_slice(&chunk?);
  }
  Ok(buffer.freeze())
}
