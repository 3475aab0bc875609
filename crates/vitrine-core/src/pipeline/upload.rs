use bytes::Bytes;
use futures::stream;
use tracing::{info, instrument, warn};

use vitrine_artifact::{ByteStream, FileUpload};
use vitrine_model::{Build, Variant, VariantState, archive_path};
use vitrine_webhook::WebhookEvent;

use crate::build::BuildLedger;
use crate::context::{Action, Context};
use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::pipeline::decompress::process_variant;
use crate::pipeline::trigger::ProcessRequest;

/// A compressed archive on its way into the blob store.
pub struct Archive {
  pub body: ByteStream,
  /// Byte length, when the transport declared one.
  pub size: Option<u64>,
}

impl Archive {
  pub fn new(body: ByteStream, size: Option<u64>) -> Self {
    Self { body, size }
  }

  pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
    let bytes = bytes.into();
    let size = Some(bytes.len() as u64);
    Self {
      body: Box::pin(stream::once(async move { Ok::<_, vitrine_artifact::Error>(bytes) })),
      size,
    }
  }
}

/// How an accepted archive is going to be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
  /// Expanded within the upload call.
  Inline,
  /// Handed to the process trigger.
  Deferred,
  /// Left `uploaded` until processing is requested explicitly.
  Pending,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
  /// The build as of the end of the upload call.
  pub build: Build,
  pub mode: ProcessingMode,
}

/// Store an archive for a build variant and start its expansion.
///
/// Only a variant in state `none` accepts an upload. The raw archive is
/// written before the variant becomes `uploaded`, and that happens before
/// any expansion starts. An inline expansion failure is logged and leaves
/// the variant where the worker stopped.
#[instrument(skip(ctx, archive), fields(size = ?archive.size))]
pub async fn upload_archive(
  ctx: &Context,
  project_id: &str,
  build_id: &str,
  variant: Variant,
  archive: Archive,
) -> Result<UploadOutcome, CoreError> {
  ctx.authorize(Some(project_id), Action::Upload)?;

  let builds = BuildLedger::new(project_id);
  let build = builds.get(ctx, build_id).await?;
  let state = build.state(variant);
  if state != VariantState::None {
    return Err(CoreError::InvalidState(format!(
      "variant '{variant}' of build '{build_id}' is already {state}"
    )));
  }

  let Archive { body, size } = archive;
  let path = archive_path(build_id, variant);
  ctx
    .run(async {
      ctx
        .services
        .blobs
        .upload_files(
          project_id,
          vec![FileUpload::new(path.clone(), body, "application/zip")],
        )
        .await
        .map_err(CoreError::from)
    })
    .await?;
  info!(path = %path, "archive stored");

  let mut build = builds
    .set_variant_state(ctx, build_id, variant, VariantState::Uploaded)
    .await?;
  builds.notify(ctx, WebhookEvent::BuildUploaded, &build).await;

  let settings = &ctx.services.config.upload;
  let mode = match size {
    Some(size) if size <= settings.inline_threshold_bytes => {
      match process_variant(ctx, project_id, build_id, variant).await {
        Ok(processed) => build = processed,
        Err(e) => {
          warn!(error = %e, "inline decompression failed");
          if let Ok(current) = builds.get(ctx, build_id).await {
            build = current;
          }
        }
      }
      ProcessingMode::Inline
    }
    _ if settings.queued_processing => {
      ctx.services.trigger.fire(
        ctx.services.clone(),
        ProcessRequest {
          project_id: project_id.to_string(),
          build_id: build_id.to_string(),
          variant,
          auth_headers: ctx.auth_headers.clone(),
        },
      );
      info!("deferred decompression triggered");
      ProcessingMode::Deferred
    }
    _ => ProcessingMode::Pending,
  };

  Ok(UploadOutcome { build, mode })
}
