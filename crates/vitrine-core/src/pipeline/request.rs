use std::io::SeekFrom;

use futures::{StreamExt, TryStreamExt};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use vitrine_artifact::ByteStream;
use vitrine_model::Variant;

use crate::error::CoreError;
use crate::pipeline::upload::Archive;

/// Media types accepted as a raw archive body.
const ARCHIVE_MEDIA_TYPES: [&str; 3] = [
  "application/zip",
  "application/x-zip-compressed",
  "application/octet-stream",
];

/// The parts of an upload request the pipeline looks at.
pub struct UploadRequest {
  pub content_type: Option<String>,
  pub content_length: Option<u64>,
  /// `variant` query parameter.
  pub variant: Option<String>,
  pub body: ByteStream,
}

/// An archive ready for [`upload_archive`](crate::pipeline::upload_archive).
pub struct ArchiveUpload {
  pub variant: Variant,
  pub archive: Archive,
}

/// Extract the archive and its variant from an upload request.
///
/// Multipart bodies carry the archive in a `file` field and may name the
/// variant in a `variant` field. Raw archive bodies need a non-zero
/// `Content-Length` and take the variant from the query.
pub async fn read_archive_upload(request: UploadRequest) -> Result<ArchiveUpload, CoreError> {
  let content_type = request.content_type.as_deref().unwrap_or_default();
  let essence = content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();

  if essence == "multipart/form-data" {
    let boundary = multer::parse_boundary(content_type)?;
    return read_multipart(request.body, boundary, request.variant).await;
  }

  if !ARCHIVE_MEDIA_TYPES.contains(&essence.as_str()) {
    return Err(CoreError::UnsupportedMediaType(if essence.is_empty() {
      "missing content type".to_string()
    } else {
      essence
    }));
  }

  let size = match request.content_length {
    Some(0) | None => {
      return Err(CoreError::InvalidInput(
        "raw archive uploads need a non-zero Content-Length".to_string(),
      ));
    }
    Some(size) => size,
  };

  Ok(ArchiveUpload {
    variant: parse_variant(request.variant)?,
    archive: Archive {
      body: request.body,
      size: Some(size),
    },
  })
}

async fn read_multipart(
  body: ByteStream,
  boundary: String,
  query_variant: Option<String>,
) -> Result<ArchiveUpload, CoreError> {
  let mut multipart = multer::Multipart::new(body, boundary);
  let mut variant = None;
  let mut archive = None;

  while let Some(mut field) = multipart.next_field().await? {
    let name = field.name().map(str::to_string);
    match name.as_deref() {
      Some("variant") => variant = Some(field.text().await?),
      Some("file") if archive.is_none() => {
        // Spool to disk so the size is known before anything is stored.
        let mut spool = tokio::fs::File::from_std(tempfile::tempfile()?);
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
          size += chunk.len() as u64;
          spool.write_all(&chunk).await?;
        }
        spool.flush().await?;
        spool.seek(SeekFrom::Start(0)).await?;

        let stream = ReaderStream::new(spool).map_err(vitrine_artifact::Error::Io);
        archive = Some(Archive {
          body: stream.boxed(),
          size: Some(size),
        });
      }
      _ => {}
    }
  }

  let archive = archive.ok_or_else(|| CoreError::InvalidInput("missing 'file' field".into()))?;
  Ok(ArchiveUpload {
    variant: parse_variant(variant.or(query_variant))?,
    archive,
  })
}

fn parse_variant(variant: Option<String>) -> Result<Variant, CoreError> {
  let variant = variant
    .filter(|v| !v.trim().is_empty())
    .ok_or_else(|| CoreError::InvalidInput("variant is required".into()))?;
  Ok(variant.trim().parse::<Variant>()?)
}

#[cfg(test)]
mod tests {
  use super::*;

  use bytes::Bytes;
  use futures::stream;
  use vitrine_artifact::read_to_bytes;

  fn body(data: &'static [u8]) -> ByteStream {
    Box::pin(stream::once(async move { Ok::<_, vitrine_artifact::Error>(Bytes::from_static(data)) }))
  }

  fn raw(content_type: &str, content_length: Option<u64>) -> UploadRequest {
    UploadRequest {
      content_type: Some(content_type.to_string()),
      content_length,
      variant: Some("primary".to_string()),
      body: body(b"PK"),
    }
  }

  #[tokio::test]
  async fn test_raw_archive_body() {
    let upload = read_archive_upload(raw("application/zip", Some(2))).await.unwrap();
    assert_eq!(upload.variant, Variant::Primary);
    assert_eq!(upload.archive.size, Some(2));
  }

  #[tokio::test]
  async fn test_raw_body_requires_length() {
    for length in [None, Some(0)] {
      let err = read_archive_upload(raw("application/zip", length))
        .await
        .err()
        .unwrap();
      assert_eq!(err.status(), 400);
    }
  }

  #[tokio::test]
  async fn test_rejects_other_media_types() {
    let err = read_archive_upload(raw("text/plain", Some(2))).await.err().unwrap();
    assert!(matches!(err, CoreError::UnsupportedMediaType(_)));
    assert_eq!(err.status(), 415);
  }

  #[tokio::test]
  async fn test_unknown_variant() {
    let mut request = raw("application/octet-stream", Some(2));
    request.variant = Some("thumbnails".to_string());
    let err = read_archive_upload(request).await.err().unwrap();
    assert!(matches!(err, CoreError::UnsupportedVariant(_)));
  }

  #[tokio::test]
  async fn test_multipart_body() {
    let payload: &'static [u8] = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"variant\"\r\n\r\n\
coverage\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"site.zip\"\r\n\
Content-Type: application/zip\r\n\r\n\
PK-archive-bytes\r\n\
--XYZ--\r\n";
    let request = UploadRequest {
      content_type: Some("multipart/form-data; boundary=XYZ".to_string()),
      content_length: Some(payload.len() as u64),
      variant: None,
      body: body(payload),
    };

    let upload = read_archive_upload(request).await.unwrap();
    assert_eq!(upload.variant, Variant::Coverage);
    assert_eq!(upload.archive.size, Some(16));
    let bytes = read_to_bytes(upload.archive.body).await.unwrap();
    assert_eq!(&bytes[..], b"PK-archive-bytes");
  }

  #[tokio::test]
  async fn test_multipart_without_file() {
    let payload: &'static [u8] = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"variant\"\r\n\r\n\
primary\r\n\
--XYZ--\r\n";
    let request = UploadRequest {
      content_type: Some("multipart/form-data; boundary=XYZ".to_string()),
      content_length: None,
      variant: None,
      body: body(payload),
    };
    let err = read_archive_upload(request).await.err().unwrap();
    assert!(matches!(err, CoreError::InvalidInput(_)));
  }
}
