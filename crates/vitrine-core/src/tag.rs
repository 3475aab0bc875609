use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use vitrine_model::{Project, Tag, TagSpecifier, TagType, slugify, to_document};
use vitrine_store::Query;
use vitrine_webhook::{DispatchOptions, WebhookEvent};

use crate::build::BuildLedger;
use crate::context::{Action, Context};
use crate::error::CoreError;
use crate::helper::{LedgerHelper, best_effort, fields, projects_collection, tags_collection};
use crate::ledger::Ledger;

/// Input for [`TagLedger::create`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
  pub value: String,
  /// Inferred from the value when absent.
  #[serde(default, rename = "type")]
  pub tag_type: Option<TagType>,
  /// Start the build count at one instead of zero.
  #[serde(default)]
  pub counts_as_initial_build: bool,
}

/// Partial update of a tag. Counts are maintained by the ledger itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub tag_type: Option<TagType>,
}

/// Ledger of the tags of one project.
#[derive(Debug, Clone)]
pub struct TagLedger {
  project_id: String,
  helper: LedgerHelper,
}

impl TagLedger {
  pub fn new(project_id: &str) -> Self {
    Self {
      project_id: project_id.to_string(),
      helper: LedgerHelper::new("tag", tags_collection(project_id)),
    }
  }

  pub fn project_id(&self) -> &str {
    &self.project_id
  }

  /// Count a new build against the tag named by `specifier`, creating the
  /// tag on first sight.
  ///
  /// Returns the tag id. Never fails: bookkeeping errors are logged and the
  /// id derived from the specifier is returned anyway.
  pub async fn resolve_or_create_for_build(
    &self,
    ctx: &Context,
    specifier: &str,
    build_id: &str,
  ) -> String {
    let specifier = TagSpecifier::parse(specifier);
    match self.reference(ctx, &specifier, build_id).await {
      Ok(id) => id,
      Err(e) => {
        let id = specifier.id();
        warn!(
          project_id = %self.project_id,
          tag_id = %id,
          build_id = %build_id,
          error = %e,
          "failed to update tag for build"
        );
        id
      }
    }
  }

  async fn reference(
    &self,
    ctx: &Context,
    specifier: &TagSpecifier,
    build_id: &str,
  ) -> Result<String, CoreError> {
    let id = specifier.id();
    if id.is_empty() {
      return Err(CoreError::InvalidInput(format!(
        "tag '{}' has no usable characters",
        specifier.value
      )));
    }

    if !self.helper.has(ctx, &id).await? {
      let tag = Tag {
        id: id.clone(),
        tag_type: specifier.resolved_type(),
        value: specifier.display().to_string(),
        builds_count: 1,
        latest_build_id: Some(build_id.to_string()),
      };
      match self.helper.insert(ctx, &id, &tag).await {
        Ok(()) => return Ok(id),
        // Created concurrently; count against the existing record.
        Err(CoreError::AlreadyExists(_)) => {}
        Err(e) => return Err(e),
      }
    }

    let tag: Tag = self.helper.get(ctx, &id).await?;
    self
      .helper
      .patch(
        ctx,
        &id,
        fields(json!({
          "buildsCount": tag.builds_count + 1,
          "latestBuildId": build_id,
        })),
      )
      .await?;
    Ok(id)
  }

  /// Drop one build reference from a tag.
  ///
  /// The count never goes below zero; the latest build pointer is cleared
  /// when it names `build_id`.
  pub async fn release_reference(
    &self,
    ctx: &Context,
    tag_id: &str,
    build_id: &str,
  ) -> Result<(), CoreError> {
    let tag: Tag = self.helper.get(ctx, tag_id).await?;
    let mut patch = fields(json!({ "buildsCount": tag.builds_count.saturating_sub(1) }));
    if tag.latest_build_id.as_deref() == Some(build_id) {
      patch.insert("latestBuildId".to_string(), serde_json::Value::Null);
    }
    self.helper.patch(ctx, tag_id, patch).await
  }

  async fn project(&self, ctx: &Context) -> Result<Project, CoreError> {
    LedgerHelper::new("project", projects_collection())
      .get(ctx, &self.project_id)
      .await
  }
}

#[async_trait]
impl Ledger for TagLedger {
  type Record = Tag;
  type New = NewTag;
  type Patch = TagPatch;

  async fn list(&self, ctx: &Context, query: Query) -> Result<Vec<Tag>, CoreError> {
    self.helper.list(ctx, &query).await
  }

  /// Create a tag explicitly. Fails with `AlreadyExists` if its slug is taken.
  async fn create(&self, ctx: &Context, input: NewTag) -> Result<Tag, CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Create)?;

    let id = slugify(&input.value);
    if id.is_empty() {
      return Err(CoreError::InvalidInput(format!(
        "tag '{}' has no usable characters",
        input.value
      )));
    }

    let tag = Tag {
      tag_type: input.tag_type.unwrap_or_else(|| TagType::infer(&input.value)),
      id,
      value: input.value,
      builds_count: u64::from(input.counts_as_initial_build),
      latest_build_id: None,
    };
    self.helper.insert(ctx, &tag.id, &tag).await?;
    Ok(tag)
  }

  async fn get(&self, ctx: &Context, id: &str) -> Result<Tag, CoreError> {
    self.helper.get(ctx, id).await
  }

  async fn has(&self, ctx: &Context, id: &str) -> Result<bool, CoreError> {
    self.helper.has(ctx, id).await
  }

  async fn update(&self, ctx: &Context, id: &str, patch: TagPatch) -> Result<Tag, CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Update)?;
    self.helper.patch(ctx, id, to_document(&patch)?).await?;
    self.helper.get(ctx, id).await
  }

  /// Delete a tag and detach or delete the builds that reference it.
  ///
  /// The default-branch tag is protected. Builds carrying other tags only
  /// lose this one; builds tagged with nothing else are deleted.
  async fn delete(&self, ctx: &Context, id: &str) -> Result<(), CoreError> {
    ctx.authorize(Some(self.project_id.as_str()), Action::Delete)?;

    let project = self.project(ctx).await?;
    if project.is_default_branch_tag(id) {
      return Err(CoreError::Protected(format!(
        "tag '{id}' is the default branch of project '{}'",
        self.project_id
      )));
    }

    self.helper.remove(ctx, id).await?;
    info!(project_id = %self.project_id, tag_id = %id, "tag deleted");

    let builds = BuildLedger::new(&self.project_id);
    let Ok(()) = best_effort("cascade tag delete to builds", builds.delete_by_tag(ctx, id, false)).await;

    ctx.services.webhooks.dispatch_detached(
      WebhookEvent::TagDeleted,
      self.project_id.clone(),
      project.webhooks,
      json!({ "id": id }),
      DispatchOptions::default(),
    );
    Ok(())
  }
}
