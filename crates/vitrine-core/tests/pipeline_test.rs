//! Integration tests for archive upload and the decompression worker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio_util::sync::CancellationToken;

use common::{Harness, zip_archive};
use vitrine_artifact::{
  BlobStore, ByteStream, Download, FileSelector, FileUpload, MemoryStore as MemoryBlobs,
};
use vitrine_config::{MIB, ServiceConfig};
use vitrine_core::{
  Archive, BuildLedger, Context, CoreError, Ledger, LocalProcessTrigger, NewBuild,
  ProcessingMode, Services, UploadRequest, process_variant, read_archive_upload,
};
use vitrine_model::{Variant, VariantState};
use vitrine_store::MemoryStore as MemoryDocuments;

async fn setup(h: &Harness) -> BuildLedger {
  h.create_project("p1", "main").await;
  let builds = BuildLedger::new("p1");
  builds
    .create(
      &h.ctx,
      NewBuild {
        id: "b1".to_string(),
        tags: vec!["main".to_string()],
        ..NewBuild::default()
      },
    )
    .await
    .unwrap();
  builds
}

fn site() -> Vec<u8> {
  zip_archive(&[
    ("index.html", b"<html></html>"),
    ("assets/app.css", b"body {}"),
    (".DS_Store", b"junk"),
    ("index.json", br#"{"v":4,"entries":{"button--primary":{"id":"button--primary","title":"Button","name":"Primary","importPath":"./Button.stories.tsx","type":"story","tags":["autodocs"]}}}"#),
  ])
}

fn stream_of(data: Vec<u8>) -> ByteStream {
  Box::pin(stream::once(async move {
    Ok::<_, vitrine_artifact::Error>(Bytes::from(data))
  }))
}

fn queued_config() -> ServiceConfig {
  let mut config = ServiceConfig::default();
  config.upload.queued_processing = true;
  config
}

#[tokio::test]
async fn test_small_archive_is_expanded_inline() {
  let h = Harness::new();
  let builds = setup(&h).await;

  // A 2 MiB payload stored without compression stays below the threshold.
  let large = vec![b'x'; 2 * MIB as usize];
  let archive = zip_archive(&[("index.html", b"<html></html>"), ("data/blob.bin", &large[..])]);
  assert!(archive.len() as u64 > 2 * MIB && (archive.len() as u64) < 5 * MIB);

  let outcome = builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(archive))
    .await
    .unwrap();

  assert_eq!(outcome.mode, ProcessingMode::Inline);
  assert_eq!(outcome.build.state(Variant::Primary), VariantState::Ready);
  assert!(h.blobs.has_file("p1", "b1/primary.zip").await.unwrap());
  assert!(h.blobs.has_file("p1", "b1/primary/index.html").await.unwrap());
  assert!(h.blobs.has_file("p1", "b1/primary/data/blob.bin").await.unwrap());
  assert!(h.fired().is_empty());

  let stored = builds.get(&h.ctx, "b1").await.unwrap();
  assert_eq!(stored.state(Variant::Primary), VariantState::Ready);
}

#[tokio::test]
async fn test_expanded_files_keep_content_types_and_skip_dotfiles() {
  let h = Harness::new();
  let builds = setup(&h).await;

  builds
    .upload(&h.ctx, "b1", Variant::Coverage, Archive::from_bytes(site()))
    .await
    .unwrap();

  let paths = h.blobs.paths("p1").await;
  assert_eq!(
    paths,
    vec![
      "b1/coverage.zip".to_string(),
      "b1/coverage/assets/app.css".to_string(),
      "b1/coverage/index.html".to_string(),
      "b1/coverage/index.json".to_string(),
    ]
  );
  let css = h.blobs.download_file("p1", "b1/coverage/assets/app.css").await.unwrap();
  assert_eq!(css.mime_type, "text/css");
}

#[tokio::test]
async fn test_second_upload_is_rejected() {
  let h = Harness::new();
  let builds = setup(&h).await;

  builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(site()))
    .await
    .unwrap();
  let err = builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(site()))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidState(_)));
  assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_large_archive_is_deferred() {
  let h = Harness::with_config(queued_config());
  let builds = setup(&h).await;
  let ctx = h.ctx.clone().with_auth_header("authorization", "Bearer token");

  let body = stream_of(site());
  let outcome = builds
    .upload(&ctx, "b1", Variant::Primary, Archive::new(body, Some(50 * MIB)))
    .await
    .unwrap();

  assert_eq!(outcome.mode, ProcessingMode::Deferred);
  assert_eq!(outcome.build.state(Variant::Primary), VariantState::Uploaded);
  assert!(!h.blobs.has_file("p1", "b1/primary/index.html").await.unwrap());

  let fired = h.fired();
  assert_eq!(fired.len(), 1);
  assert_eq!(fired[0].build_id, "b1");
  assert_eq!(fired[0].variant, Variant::Primary);
  assert_eq!(
    fired[0].auth_headers,
    vec![("authorization".to_string(), "Bearer token".to_string())]
  );
}

#[tokio::test]
async fn test_unknown_size_without_queue_stays_uploaded() {
  let h = Harness::new();
  let builds = setup(&h).await;

  let body = stream_of(site());
  let outcome = builds
    .upload(&h.ctx, "b1", Variant::TestReport, Archive::new(body, None))
    .await
    .unwrap();

  assert_eq!(outcome.mode, ProcessingMode::Pending);
  assert_eq!(outcome.build.state(Variant::TestReport), VariantState::Uploaded);
  assert!(h.fired().is_empty());

  // Processing can be requested explicitly afterwards.
  let build = process_variant(&h.ctx, "p1", "b1", Variant::TestReport).await.unwrap();
  assert_eq!(build.state(Variant::TestReport), VariantState::Ready);
}

#[tokio::test]
async fn test_worker_is_idempotent() {
  let h = Harness::new();
  let builds = setup(&h).await;
  builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(site()))
    .await
    .unwrap();
  let first = h.blobs.paths("p1").await;

  let build = process_variant(&h.ctx, "p1", "b1", Variant::Primary).await.unwrap();
  assert_eq!(build.state(Variant::Primary), VariantState::Ready);
  assert_eq!(h.blobs.paths("p1").await, first);
}

#[tokio::test]
async fn test_worker_requires_an_archive() {
  let h = Harness::new();
  setup(&h).await;

  let err = process_variant(&h.ctx, "p1", "b1", Variant::Screenshots)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidState(_)));
}

#[tokio::test]
async fn test_corrupt_archive_leaves_variant_processing() {
  let h = Harness::new();
  let builds = setup(&h).await;

  let outcome = builds
    .upload(
      &h.ctx,
      "b1",
      Variant::Primary,
      Archive::from_bytes(b"definitely not a zip".to_vec()),
    )
    .await
    .unwrap();
  assert_eq!(outcome.mode, ProcessingMode::Inline);
  assert_eq!(outcome.build.state(Variant::Primary), VariantState::Processing);

  // A retry after replacing the archive succeeds.
  h.blobs
    .upload_files(
      "p1",
      vec![FileUpload::new("b1/primary.zip", site(), "application/zip")],
    )
    .await
    .unwrap();
  let build = process_variant(&h.ctx, "p1", "b1", Variant::Primary).await.unwrap();
  assert_eq!(build.state(Variant::Primary), VariantState::Ready);
}

#[tokio::test]
async fn test_missing_archive_fails_processing() {
  let h = Harness::new();
  let builds = setup(&h).await;
  let body = stream_of(site());
  builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::new(body, None))
    .await
    .unwrap();
  h.blobs
    .delete_files("p1", FileSelector::Paths(vec!["b1/primary.zip".to_string()]))
    .await
    .unwrap();

  let err = process_variant(&h.ctx, "p1", "b1", Variant::Primary).await.unwrap_err();
  assert!(matches!(err, CoreError::NotFound(_)));
  let build = builds.get(&h.ctx, "b1").await.unwrap();
  assert_eq!(build.state(Variant::Primary), VariantState::Processing);
}

#[tokio::test]
async fn test_stories_from_ready_primary() {
  let h = Harness::new();
  let builds = setup(&h).await;

  let build = builds.get(&h.ctx, "b1").await.unwrap();
  assert!(builds.get_stories(&h.ctx, &build).await.is_none());

  let outcome = builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(site()))
    .await
    .unwrap();
  let stories = builds.get_stories(&h.ctx, &outcome.build).await.unwrap();
  assert_eq!(stories.len(), 1);
  assert_eq!(stories[0].id, "button--primary");
  assert_eq!(stories[0].title, "Button");
}

#[tokio::test]
async fn test_malformed_story_manifest_yields_empty_list() {
  let h = Harness::new();
  let builds = setup(&h).await;
  let archive = zip_archive(&[("index.html", b"x"), ("index.json", b"{ nope")]);

  let outcome = builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::from_bytes(archive))
    .await
    .unwrap();
  let stories = builds.get_stories(&h.ctx, &outcome.build).await;
  assert_eq!(stories, Some(vec![]));
}

#[tokio::test]
async fn test_upload_from_raw_request() {
  let h = Harness::new();
  let builds = setup(&h).await;
  let archive = site();

  let request = UploadRequest {
    content_type: Some("application/zip".to_string()),
    content_length: Some(archive.len() as u64),
    variant: Some("screenshots".to_string()),
    body: stream_of(archive),
  };
  let upload = read_archive_upload(request).await.unwrap();
  let outcome = builds
    .upload(&h.ctx, "b1", upload.variant, upload.archive)
    .await
    .unwrap();
  assert_eq!(outcome.build.state(Variant::Screenshots), VariantState::Ready);
}

#[tokio::test]
async fn test_local_trigger_processes_in_background() {
  let documents = Arc::new(MemoryDocuments::new());
  let blobs = Arc::new(MemoryBlobs::new());
  let services = Services::new(documents.clone(), blobs.clone(), queued_config())
    .with_trigger(Arc::new(LocalProcessTrigger::new(CancellationToken::new())));
  let ctx = Context::new(Arc::new(services), CancellationToken::new());
  let h = Harness {
    ctx,
    documents,
    blobs,
    trigger: Arc::default(),
  };
  let builds = setup(&h).await;

  let body = stream_of(site());
  let outcome = builds
    .upload(&h.ctx, "b1", Variant::Primary, Archive::new(body, Some(50 * MIB)))
    .await
    .unwrap();
  assert_eq!(outcome.mode, ProcessingMode::Deferred);

  let mut state = VariantState::Uploaded;
  for _ in 0..100 {
    state = builds.get(&h.ctx, "b1").await.unwrap().state(Variant::Primary);
    if state == VariantState::Ready {
      break;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  assert_eq!(state, VariantState::Ready);
  assert!(h.blobs.has_file("p1", "b1/primary/index.html").await.unwrap());
}

#[tokio::test]
async fn test_cancelled_context_aborts_upload() {
  let h = Harness::new();
  let builds = setup(&h).await;
  let cancel = CancellationToken::new();
  let ctx = Context::new(h.ctx.services.clone(), cancel.clone());
  cancel.cancel();

  let err = builds
    .upload(&ctx, "b1", Variant::Primary, Archive::from_bytes(site()))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Cancelled));
  let build = builds.get(&h.ctx, "b1").await.unwrap();
  assert_eq!(build.state(Variant::Primary), VariantState::None);
}

/// Cancels `cancel` as soon as a download starts.
struct CancelOnDownload {
  inner: Arc<MemoryBlobs>,
  cancel: CancellationToken,
}

#[async_trait]
impl BlobStore for CancelOnDownload {
  async fn list_containers(&self) -> Result<Vec<String>, vitrine_artifact::Error> {
    self.inner.list_containers().await
  }

  async fn create_container(&self, container_id: &str) -> Result<(), vitrine_artifact::Error> {
    self.inner.create_container(container_id).await
  }

  async fn delete_container(&self, container_id: &str) -> Result<(), vitrine_artifact::Error> {
    self.inner.delete_container(container_id).await
  }

  async fn has_container(&self, container_id: &str) -> Result<bool, vitrine_artifact::Error> {
    self.inner.has_container(container_id).await
  }

  async fn upload_files(
    &self,
    container_id: &str,
    files: Vec<FileUpload>,
  ) -> Result<(), vitrine_artifact::Error> {
    self.inner.upload_files(container_id, files).await
  }

  async fn delete_files(
    &self,
    container_id: &str,
    selector: FileSelector,
  ) -> Result<(), vitrine_artifact::Error> {
    self.inner.delete_files(container_id, selector).await
  }

  async fn has_file(&self, container_id: &str, path: &str) -> Result<bool, vitrine_artifact::Error> {
    self.inner.has_file(container_id, path).await
  }

  async fn download_file(
    &self,
    container_id: &str,
    path: &str,
  ) -> Result<Download, vitrine_artifact::Error> {
    self.cancel.cancel();
    self.inner.download_file(container_id, path).await
  }
}

fn scratch_dirs(prefix: &str) -> Vec<String> {
  std::fs::read_dir(std::env::temp_dir())
    .unwrap()
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.file_name().to_string_lossy().into_owned())
    .filter(|name| name.starts_with(prefix))
    .collect()
}

#[tokio::test]
async fn test_cancelled_worker_removes_scratch_directory() {
  let h = Harness::new();
  h.create_project("scratch-check", "main").await;
  let builds = BuildLedger::new("scratch-check");
  builds
    .create(
      &h.ctx,
      NewBuild {
        id: "c1".to_string(),
        tags: vec!["main".to_string()],
        ..NewBuild::default()
      },
    )
    .await
    .unwrap();
  let outcome = builds
    .upload(&h.ctx, "c1", Variant::Primary, Archive::new(stream_of(site()), None))
    .await
    .unwrap();
  assert_eq!(outcome.mode, ProcessingMode::Pending);

  let cancel = CancellationToken::new();
  let blobs = CancelOnDownload {
    inner: h.blobs.clone(),
    cancel: cancel.clone(),
  };
  let services = Services::new(h.documents.clone(), Arc::new(blobs), ServiceConfig::default());
  let ctx = Context::new(Arc::new(services), cancel);

  let err = process_variant(&ctx, "scratch-check", "c1", Variant::Primary)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Cancelled));

  assert!(scratch_dirs("vitrine-scratch-check-c1-primary-").is_empty());
  assert_eq!(h.blobs.paths("scratch-check").await, vec!["c1/primary.zip".to_string()]);
  let build = builds.get(&h.ctx, "c1").await.unwrap();
  assert_eq!(build.state(Variant::Primary), VariantState::Processing);
}
