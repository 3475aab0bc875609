use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use vitrine_artifact::FileSelector;
use vitrine_model::{
  Build, Project, StoryDescriptor, TagSet, TagSpecifier, Variant, VariantState, VariantStates, build_prefix,
  parse_story_manifest, to_document, variant_prefix,
};
use vitrine_store::{Filter, Query};
use vitrine_webhook::{DispatchOptions, WebhookEvent};

use crate::context::{Action, Context};
use crate::error::CoreError;
use crate::helper::{LedgerHelper, best_effort, builds_collection, fields, projects_collection};
use crate::ledger::Ledger;
use crate::pipeline::{Archive, UploadOutcome, upload_archive};
use crate::project::ProjectLedger;
use crate::tag::TagLedger;

/// Story manifests looked up under the primary variant, newest format first.
const STORY_MANIFESTS: [&str; 2] = ["index.json", "stories.json"];

/// Input for [`BuildLedger::create`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBuild {
  pub id: String,
  /// Tag specifiers: `value`, `value;type` or `value;type;displayValue`.
  pub tags: Vec<String>,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub author_name: String,
  #[serde(default)]
  pub author_email: String,
}

/// Partial update of build metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub author_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub author_email: Option<String>,
}

/// Ledger of the builds of one project.
///
/// Keeps tag counts and the project's latest build pointer consistent with
/// the set of stored builds.
#[derive(Debug, Clone)]
pub struct BuildLedger {
  project_id: String,
  helper: LedgerHelper,
}

impl BuildLedger {
  pub fn new(project_id: &str) -> Self {
    Self {
      project_id: project_id.to_string(),
      helper: LedgerHelper::new("build", builds_collection(project_id)),
    }
  }

  pub fn project_id(&self) -> &str {
    &self.project_id
  }

  async fn project(&self, ctx: &Context) -> Result<Project, CoreError> {
    LedgerHelper::new("project", projects_collection())
      .get(ctx, &self.project_id)
      .await
  }

  /// Delete a build and its stored files.
  ///
  /// With `cascade_tag_update` every referenced tag loses one reference. The
  /// project's latest build pointer is cleared when it names this build.
  pub async fn delete_with_cascade(
    &self,
    ctx: &Context,
    build_id: &str,
    cascade_tag_update: bool,
  ) -> Result<(), CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Delete)?;

    let build: Build = self.helper.get(ctx, build_id).await?;
    self.helper.remove(ctx, build_id).await?;

    let blobs = &ctx.services.blobs;
    let Ok(()) = best_effort("delete build files", async {
      blobs
        .delete_files(&self.project_id, FileSelector::Prefix(build_prefix(build_id)))
        .await
        .map_err(CoreError::from)
    })
    .await;

    if cascade_tag_update {
      let tags = TagLedger::new(&self.project_id);
      for tag_id in build.tag_ids.iter() {
        let Ok(()) = best_effort(
          "release tag reference",
          tags.release_reference(ctx, tag_id, build_id),
        )
        .await;
      }
    }

    let Ok(()) = best_effort(
      "clear latest build",
      ProjectLedger::new().clear_latest_build_if(ctx, &self.project_id, build_id),
    )
    .await;

    info!(project_id = %self.project_id, build_id = %build_id, "build deleted");
    self.notify(ctx, WebhookEvent::BuildDeleted, &build).await;
    Ok(())
  }

  /// Remove `tag_id` from every build that references it.
  ///
  /// Without `force`, builds that carry other tags are only detached from
  /// this one. Everything else is deleted without touching tag counts. The
  /// builds are handled concurrently and individual failures are logged.
  pub async fn delete_by_tag(
    &self,
    ctx: &Context,
    tag_id: &str,
    force: bool,
  ) -> Result<(), CoreError> {
    let query = Query::new().filter(Filter::contains_item("tagIds", tag_id));
    let builds: Vec<Build> = self.helper.list(ctx, &query).await?;
    debug!(
      project_id = %self.project_id,
      tag_id = %tag_id,
      builds = builds.len(),
      force,
      "removing tag from builds"
    );

    let operations = builds.iter().map(|build| async move {
      if !force && build.tag_ids.len() > 1 {
        best_effort("detach tag from build", self.detach_tag(ctx, build, tag_id)).await
      } else {
        best_effort(
          "delete build for tag",
          self.delete_with_cascade(ctx, &build.id, false),
        )
        .await
      }
    });
    join_all(operations).await;
    Ok(())
  }

  async fn detach_tag(&self, ctx: &Context, build: &Build, tag_id: &str) -> Result<(), CoreError> {
    let remaining = build.tag_ids.without(tag_id);
    self
      .helper
      .patch(
        ctx,
        &build.id,
        fields(json!({ "tagIds": remaining.to_delimited() })),
      )
      .await
  }

  /// Accept an archive for one variant of a build.
  ///
  /// The variant is `uploaded` when this returns, or further along when the
  /// archive was small enough to expand inline.
  pub async fn upload(
    &self,
    ctx: &Context,
    build_id: &str,
    variant: Variant,
    archive: Archive,
  ) -> Result<UploadOutcome, CoreError> {
    upload_archive(ctx, &self.project_id, build_id, variant, archive).await
  }

  /// Move a variant to `next`, enforcing the variant state machine.
  pub async fn set_variant_state(
    &self,
    ctx: &Context,
    build_id: &str,
    variant: Variant,
    next: VariantState,
  ) -> Result<Build, CoreError> {
    let mut build: Build = self.helper.get(ctx, build_id).await?;
    let current = build.state(variant);
    if !current.can_transition_to(next) {
      return Err(CoreError::InvalidState(format!(
        "variant '{variant}' of build '{build_id}' cannot move from {current} to {next}"
      )));
    }

    let now = Utc::now();
    let mut patch = fields(json!({ "updatedAt": now.timestamp_millis() }));
    patch.insert(variant.as_str().to_string(), json!(next));
    self.helper.patch(ctx, build_id, patch).await?;

    debug!(
      project_id = %self.project_id,
      build_id = %build_id,
      variant = %variant,
      state = %next,
      "variant state changed"
    );
    build.variants.set(variant, next);
    build.updated_at = now;
    Ok(build)
  }

  /// Stories published by the primary variant.
  ///
  /// `None` unless the primary variant is ready and a manifest can be read.
  /// A manifest that cannot be parsed yields an empty list.
  pub async fn get_stories(&self, ctx: &Context, build: &Build) -> Option<Vec<StoryDescriptor>> {
    if build.state(Variant::Primary) != VariantState::Ready {
      return None;
    }

    let prefix = variant_prefix(&build.id, Variant::Primary);
    for manifest in STORY_MANIFESTS {
      let path = format!("{prefix}{manifest}");
      let download = ctx
        .run(async {
          let download = ctx
            .services
            .blobs
            .download_file(&self.project_id, &path)
            .await
            .map_err(CoreError::from)?;
          download.bytes().await.map_err(CoreError::from)
        })
        .await;

      match download {
        Ok(bytes) => {
          return match parse_story_manifest(&bytes) {
            Ok(stories) => Some(stories),
            Err(e) => {
              warn!(build_id = %build.id, path = %path, error = %e, "malformed story manifest");
              Some(Vec::new())
            }
          };
        }
        Err(CoreError::NotFound(_)) => continue,
        Err(e) => {
          warn!(build_id = %build.id, path = %path, error = %e, "failed to read story manifest");
          return None;
        }
      }
    }
    None
  }

  pub(crate) async fn notify(&self, ctx: &Context, event: WebhookEvent, build: &Build) {
    let hooks = match self.project(ctx).await {
      Ok(project) => project.webhooks,
      Err(e) => {
        warn!(project_id = %self.project_id, error = %e, "project hooks unavailable");
        Vec::new()
      }
    };
    ctx.services.webhooks.dispatch_detached(
      event,
      self.project_id.clone(),
      hooks,
      serde_json::to_value(build).unwrap_or_default(),
      DispatchOptions::default(),
    );
  }
}

#[async_trait]
impl Ledger for BuildLedger {
  type Record = Build;
  type New = NewBuild;
  type Patch = BuildPatch;

  async fn list(&self, ctx: &Context, query: Query) -> Result<Vec<Build>, CoreError> {
    self.helper.list(ctx, &query).await
  }

  /// Create a build, counting it against each of its tags.
  ///
  /// When one of the tags is the default branch the build becomes the
  /// project's latest build.
  async fn create(&self, ctx: &Context, input: NewBuild) -> Result<Build, CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Create)?;

    let id = input.id.trim().to_string();
    if id.is_empty() || id.contains('/') || id.starts_with('.') {
      return Err(CoreError::InvalidInput(format!("invalid build id '{}'", input.id)));
    }
    if input.tags.iter().all(|t| t.trim().is_empty()) {
      return Err(CoreError::InvalidInput("a build needs at least one tag".into()));
    }

    let project = self.project(ctx).await?;
    if self.helper.has(ctx, &id).await? {
      return Err(CoreError::AlreadyExists(format!("build '{id}'")));
    }

    let tags = TagLedger::new(&self.project_id);
    let mut tag_ids = TagSet::new();
    for specifier in input.tags.iter().filter(|t| !t.trim().is_empty()) {
      // Specifiers that slug to the same tag count the build once.
      if tag_ids.contains(&TagSpecifier::parse(specifier).id()) {
        continue;
      }
      tag_ids.insert(tags.resolve_or_create_for_build(ctx, specifier, &id).await);
    }

    let now = Utc::now();
    let build = Build {
      id,
      tag_ids,
      variants: VariantStates::default(),
      message: input.message,
      author_name: input.author_name,
      author_email: input.author_email,
      created_at: now,
      updated_at: now,
    };
    self.helper.insert(ctx, &build.id, &build).await?;

    if build.tag_ids.contains(&project.default_branch_tag_id()) {
      let Ok(()) = best_effort(
        "set latest build",
        ProjectLedger::new().set_latest_build(ctx, &self.project_id, &build.id),
      )
      .await;
    }

    info!(
      project_id = %self.project_id,
      build_id = %build.id,
      tags = %build.tag_ids.to_delimited(),
      "build created"
    );
    self.notify(ctx, WebhookEvent::BuildCreated, &build).await;
    Ok(build)
  }

  async fn get(&self, ctx: &Context, id: &str) -> Result<Build, CoreError> {
    self.helper.get(ctx, id).await
  }

  async fn has(&self, ctx: &Context, id: &str) -> Result<bool, CoreError> {
    self.helper.has(ctx, id).await
  }

  async fn update(&self, ctx: &Context, id: &str, patch: BuildPatch) -> Result<Build, CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Update)?;
    let mut document = to_document(&patch)?;
    document.insert("updatedAt".to_string(), json!(Utc::now().timestamp_millis()));
    self.helper.patch(ctx, id, document).await?;
    self.helper.get(ctx, id).await
  }

  async fn delete(&self, ctx: &Context, id: &str) -> Result<(), CoreError> {
    self.delete_with_cascade(ctx, id, true).await
  }
}
