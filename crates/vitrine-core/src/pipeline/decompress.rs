use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use vitrine_artifact::{FileUpload, content_type_for};
use vitrine_model::{Build, Variant, VariantState, archive_path, variant_prefix};
use vitrine_webhook::WebhookEvent;

use crate::build::BuildLedger;
use crate::context::{Action, Context};
use crate::error::CoreError;
use crate::ledger::Ledger;

/// Expand the stored archive of a build variant into the blob store.
///
/// The archive at `{buildId}/{variant}.zip` is downloaded into a scratch
/// directory unique to this call, expanded, and every regular file that is
/// not a dotfile is uploaded to `{buildId}/{variant}/{relativePath}`. The
/// scratch directory is removed on every exit path.
///
/// Re-running overwrites earlier output. A failure leaves the variant in
/// `processing`; a variant that is already `ready` stays `ready`.
#[instrument(skip(ctx))]
pub async fn process_variant(
  ctx: &Context,
  project_id: &str,
  build_id: &str,
  variant: Variant,
) -> Result<Build, CoreError> {
  ctx.authorize(Some(project_id), Action::Process)?;

  let builds = BuildLedger::new(project_id);
  let build = builds.get(ctx, build_id).await?;
  let already_ready = match build.state(variant) {
    VariantState::None => {
      return Err(CoreError::InvalidState(format!(
        "variant '{variant}' of build '{build_id}' has no archive"
      )));
    }
    VariantState::Ready => true,
    VariantState::Uploaded | VariantState::Processing => {
      builds
        .set_variant_state(ctx, build_id, variant, VariantState::Processing)
        .await?;
      false
    }
  };

  let scratch = tempfile::Builder::new()
    .prefix(&format!(
      "vitrine-{project_id}-{build_id}-{variant}-{}-",
      Utc::now().timestamp_millis()
    ))
    .tempdir()?;

  let published = expand_and_publish(ctx, project_id, build_id, variant, scratch.path()).await;
  let scratch_path = scratch.path().to_path_buf();
  if let Err(e) = scratch.close() {
    warn!(path = %scratch_path.display(), error = %e, "failed to remove scratch directory");
  }
  let files = published?;

  let build = if already_ready {
    builds.get(ctx, build_id).await?
  } else {
    builds
      .set_variant_state(ctx, build_id, variant, VariantState::Ready)
      .await?
  };

  info!(files, "variant processed");
  builds.notify(ctx, WebhookEvent::BuildProcessed, &build).await;
  Ok(build)
}

/// Download, expand and upload. Returns the number of published files.
///
/// Cancellation is observed while downloading and uploading. A running
/// expansion is always awaited so nothing writes into `scratch` after this
/// returns.
async fn expand_and_publish(
  ctx: &Context,
  project_id: &str,
  build_id: &str,
  variant: Variant,
  scratch: &Path,
) -> Result<usize, CoreError> {
  let blobs = &ctx.services.blobs;

  let archive = scratch.join("archive.zip");
  ctx
    .run(async {
      let download = blobs
        .download_file(project_id, &archive_path(build_id, variant))
        .await?;
      let mut file = tokio::fs::File::create(&archive).await?;
      let mut content = download.content;
      while let Some(chunk) = content.next().await {
        file.write_all(&chunk?).await?;
      }
      file.flush().await?;
      Ok::<_, CoreError>(())
    })
    .await?;

  let expanded = scratch.join("expanded");
  let target = expanded.clone();
  tokio::task::spawn_blocking(move || extract(&archive, &target))
    .await
    .map_err(|e| CoreError::internal("archive expansion task", e))??;

  let mut files = Vec::new();
  list_files(&expanded, &expanded, &mut files).await?;
  debug!(files = files.len(), "archive expanded");

  let prefix = variant_prefix(build_id, variant);
  let concurrency = ctx.services.config.upload.upload_concurrency.max(1);
  let count = files.len();

  ctx
    .run(
      stream::iter(files)
        .map(|(path, relative)| {
          let target = format!("{prefix}{relative}");
          async move {
            let file = tokio::fs::File::open(&path).await?;
            let body = ReaderStream::new(file)
              .map_err(vitrine_artifact::Error::Io)
              .boxed();
            let mime_type = content_type_for(&target);
            blobs
              .upload_files(project_id, vec![FileUpload::new(target, body, mime_type)])
              .await?;
            Ok::<_, CoreError>(())
          }
        })
        .buffer_unordered(concurrency)
        .try_collect::<Vec<()>>(),
    )
    .await?;

  Ok(count)
}

fn extract(archive: &Path, target: &Path) -> Result<(), CoreError> {
  let file = std::fs::File::open(archive)?;
  let mut zip = zip::ZipArchive::new(file)
    .map_err(|e| CoreError::InvalidInput(format!("invalid archive: {e}")))?;
  zip
    .extract(target)
    .map_err(|e| CoreError::InvalidInput(format!("failed to expand archive: {e}")))
}

/// Regular files below `dir`, skipping dotfiles and dot directories, paired
/// with their `/`-separated path relative to `root`.
async fn list_files(
  root: &Path,
  dir: &Path,
  files: &mut Vec<(PathBuf, String)>,
) -> Result<(), io::Error> {
  let mut entries = match tokio::fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };

  while let Some(entry) = entries.next_entry().await? {
    if entry.file_name().to_string_lossy().starts_with('.') {
      continue;
    }

    let path = entry.path();
    let file_type = entry.file_type().await?;
    if file_type.is_dir() {
      Box::pin(list_files(root, &path, files)).await?;
    } else if file_type.is_file()
      && let Ok(relative) = path.strip_prefix(root)
    {
      let relative: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
      files.push((path.clone(), relative.join("/")));
    }
  }

  Ok(())
}
