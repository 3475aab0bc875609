use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use vitrine_config::HookConfig;
use vitrine_model::{Project, slugify, to_document};
use vitrine_store::Query;
use vitrine_webhook::{DispatchOptions, WebhookEvent};

use crate::context::{Action, Context};
use crate::error::CoreError;
use crate::helper::{LedgerHelper, best_effort, builds_collection, fields, projects_collection, tags_collection};
use crate::ledger::Ledger;
use crate::tag::{NewTag, TagLedger};

/// Input for [`ProjectLedger::create`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  /// Defaults to the slug of `name`.
  #[serde(default)]
  pub id: Option<String>,
  pub name: String,
  #[serde(default)]
  pub git_hub_repository: String,
  pub git_hub_default_branch: String,
  #[serde(default)]
  pub purge_retention_days: Option<u32>,
  #[serde(default)]
  pub webhooks: Vec<HookConfig>,
}

/// Partial update of a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub git_hub_repository: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub purge_retention_days: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub webhooks: Option<Vec<HookConfig>>,
}

/// Ledger of projects.
///
/// Creating a project also provisions its build and tag collections, its
/// blob container and the default-branch tag.
#[derive(Debug, Clone)]
pub struct ProjectLedger {
  helper: LedgerHelper,
}

impl Default for ProjectLedger {
  fn default() -> Self {
    Self::new()
  }
}

impl ProjectLedger {
  pub fn new() -> Self {
    Self {
      helper: LedgerHelper::new("project", projects_collection()),
    }
  }

  /// Create the projects collection if it is missing.
  pub async fn bootstrap(&self, ctx: &Context) -> Result<(), CoreError> {
    let created = ctx
      .run(async {
        ctx
          .services
          .documents
          .create_collection(projects_collection())
          .await
          .map_err(CoreError::from)
      })
      .await;
    match created {
      Ok(()) | Err(CoreError::AlreadyExists(_)) => Ok(()),
      Err(e) => Err(e),
    }
  }

  /// Point the project at its newest default-branch build.
  pub async fn set_latest_build(
    &self,
    ctx: &Context,
    project_id: &str,
    build_id: &str,
  ) -> Result<(), CoreError> {
    self
      .helper
      .patch(ctx, project_id, fields(json!({ "latestBuildId": build_id })))
      .await
  }

  /// Clear the latest build pointer if it refers to `build_id`.
  pub async fn clear_latest_build_if(
    &self,
    ctx: &Context,
    project_id: &str,
    build_id: &str,
  ) -> Result<(), CoreError> {
    let project: Project = self.helper.get(ctx, project_id).await?;
    if project.latest_build_id.as_deref() != Some(build_id) {
      return Ok(());
    }
    self
      .helper
      .patch(ctx, project_id, fields(json!({ "latestBuildId": null })))
      .await
  }

  async fn provision(&self, ctx: &Context, project: &Project) -> Result<(), CoreError> {
    let services = ctx.services();
    for collection in [builds_collection(&project.id), tags_collection(&project.id)] {
      match services.documents.create_collection(&collection).await {
        Ok(()) | Err(vitrine_store::Error::AlreadyExists(_)) => {}
        Err(e) => return Err(e.into()),
      }
    }

    match services.blobs.create_container(&project.id).await {
      Ok(()) | Err(vitrine_artifact::Error::AlreadyExists(_)) => {}
      Err(e) => return Err(e.into()),
    }

    let default_tag = NewTag {
      value: project.git_hub_default_branch.clone(),
      tag_type: None,
      counts_as_initial_build: false,
    };
    match TagLedger::new(&project.id).create(ctx, default_tag).await {
      Ok(_) | Err(CoreError::AlreadyExists(_)) => Ok(()),
      Err(e) => Err(e),
    }
  }
}

#[async_trait]
impl Ledger for ProjectLedger {
  type Record = Project;
  type New = NewProject;
  type Patch = ProjectPatch;

  async fn list(&self, ctx: &Context, query: Query) -> Result<Vec<Project>, CoreError> {
    self.bootstrap(ctx).await?;
    self.helper.list(ctx, &query).await
  }

  async fn create(&self, ctx: &Context, input: NewProject) -> Result<Project, CoreError> {
    let id = slugify(input.id.as_deref().unwrap_or(&input.name));
    ctx.authorize(Some(id.as_str()), Action::Create)?;

    if id.is_empty() {
      return Err(CoreError::InvalidInput("project id must not be empty".into()));
    }
    if slugify(&input.git_hub_default_branch).is_empty() {
      return Err(CoreError::InvalidInput("default branch must not be empty".into()));
    }

    let project = Project {
      id,
      name: input.name,
      git_hub_repository: input.git_hub_repository,
      git_hub_default_branch: input.git_hub_default_branch,
      latest_build_id: None,
      purge_retention_days: input.purge_retention_days,
      webhooks: input.webhooks,
    };

    self.bootstrap(ctx).await?;
    self.helper.insert(ctx, &project.id, &project).await?;
    ctx.run(self.provision(ctx, &project)).await?;

    info!(project_id = %project.id, "project created");
    ctx.services.webhooks.dispatch_detached(
      WebhookEvent::ProjectCreated,
      project.id.clone(),
      project.webhooks.clone(),
      serde_json::to_value(&project).unwrap_or_default(),
      DispatchOptions::default(),
    );
    Ok(project)
  }

  async fn get(&self, ctx: &Context, id: &str) -> Result<Project, CoreError> {
    self.helper.get(ctx, id).await
  }

  async fn has(&self, ctx: &Context, id: &str) -> Result<bool, CoreError> {
    self.helper.has(ctx, id).await
  }

  async fn update(&self, ctx: &Context, id: &str, patch: ProjectPatch) -> Result<Project, CoreError> {
    ctx.authorize(Some(id), Action::Update)?;
    self.helper.patch(ctx, id, to_document(&patch)?).await?;
    self.helper.get(ctx, id).await
  }

  async fn delete(&self, ctx: &Context, id: &str) -> Result<(), CoreError> {
    ctx.authorize(Some(id), Action::Delete)?;
    let project: Project = self.helper.get(ctx, id).await?;
    self.helper.remove(ctx, id).await?;

    let services = ctx.services();
    for collection in [builds_collection(id), tags_collection(id)] {
      let Ok(()) = best_effort("delete project collection", async {
        services
          .documents
          .delete_collection(&collection)
          .await
          .map_err(CoreError::from)
      })
      .await;
    }
    let Ok(()) = best_effort("delete project container", async {
      services
        .blobs
        .delete_container(id)
        .await
        .map_err(CoreError::from)
    })
    .await;

    info!(project_id = %id, "project deleted");
    services.webhooks.dispatch_detached(
      WebhookEvent::ProjectDeleted,
      project.id.clone(),
      Vec::new(),
      serde_json::to_value(&project).unwrap_or_default(),
      DispatchOptions {
        skip_project_hooks: true,
        ..DispatchOptions::default()
      },
    );
    Ok(())
  }
}
