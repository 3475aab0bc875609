//! Purge sweep.
//!
//! Deletes builds that have not been updated within their project's
//! retention window, except the project's latest build, then deletes the
//! tags no build refers to anymore, except the default-branch tag.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use vitrine_model::{Build, Project, Tag};
use vitrine_store::{Filter, Query};

use crate::build::BuildLedger;
use crate::context::{Action, Context, Services};
use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::project::ProjectLedger;
use crate::tag::TagLedger;

/// Outcome of sweeping one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPurge {
  pub project_id: String,
  pub deleted_builds: Vec<String>,
  pub deleted_tags: Vec<String>,
  /// Set when the sweep for this project stopped early.
  pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
  pub projects: Vec<ProjectPurge>,
}

impl PurgeReport {
  pub fn deleted_builds(&self) -> usize {
    self.projects.iter().map(|p| p.deleted_builds.len()).sum()
  }

  pub fn deleted_tags(&self) -> usize {
    self.projects.iter().map(|p| p.deleted_tags.len()).sum()
  }

  pub fn failed_projects(&self) -> usize {
    self.projects.iter().filter(|p| p.error.is_some()).count()
  }
}

/// Sweep one project, or every project when `project_id` is `None`.
///
/// Projects are swept concurrently and independently: a failing project is
/// recorded in the report and does not stop the others. Only listing the
/// projects or an authorization failure aborts the whole run.
#[instrument(skip(ctx))]
pub async fn run(ctx: &Context, project_id: Option<&str>) -> Result<PurgeReport, CoreError> {
  ctx.authorize(project_id, Action::Purge)?;

  let project_ids = match project_id {
    Some(id) => vec![id.to_string()],
    None => ProjectLedger::new()
      .list(ctx, Query::new())
      .await?
      .into_iter()
      .map(|p| p.id)
      .collect(),
  };

  let now = Utc::now();
  let sweeps = project_ids.iter().map(|id| async move {
    let mut outcome = ProjectPurge {
      project_id: id.clone(),
      ..ProjectPurge::default()
    };
    if let Err(e) = sweep_project(ctx, id, now, &mut outcome).await {
      warn!(project_id = %id, error = %e, "purge sweep failed");
      outcome.error = Some(e.to_string());
    }
    outcome
  });

  let report = PurgeReport {
    projects: join_all(sweeps).await,
  };
  info!(
    projects = report.projects.len(),
    deleted_builds = report.deleted_builds(),
    deleted_tags = report.deleted_tags(),
    failed = report.failed_projects(),
    "purge finished"
  );
  Ok(report)
}

async fn sweep_project(
  ctx: &Context,
  project_id: &str,
  now: DateTime<Utc>,
  outcome: &mut ProjectPurge,
) -> Result<(), CoreError> {
  let project: Project = ProjectLedger::new().get(ctx, project_id).await?;
  let retention_days = project
    .purge_retention_days
    .unwrap_or(ctx.services.config.purge.default_retention_days);
  let expiry = now - chrono::Duration::days(i64::from(retention_days));

  let mut query = Query::new().filter(Filter::lt("updatedAt", expiry.timestamp_millis()));
  if let Some(latest) = &project.latest_build_id {
    query = query.filter(Filter::ne("id", latest.as_str()));
  }

  // Sequential within a project to bound the load on the stores.
  let builds = BuildLedger::new(project_id);
  let expired: Vec<Build> = builds.list(ctx, query).await?;
  for build in expired {
    match builds.delete_with_cascade(ctx, &build.id, true).await {
      Ok(()) => outcome.deleted_builds.push(build.id),
      Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
      Err(e) => warn!(project_id = %project_id, build_id = %build.id, error = %e, "failed to purge build"),
    }
  }

  let tags = TagLedger::new(project_id);
  let default_tag = project.default_branch_tag_id();
  let unused: Vec<Tag> = tags
    .list(ctx, Query::new().filter(Filter::eq("buildsCount", 0u64)))
    .await?;
  for tag in unused.into_iter().filter(|t| t.id != default_tag) {
    match tags.delete(ctx, &tag.id).await {
      Ok(()) => outcome.deleted_tags.push(tag.id),
      Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
      Err(e) => warn!(project_id = %project_id, tag_id = %tag.id, error = %e, "failed to purge tag"),
    }
  }

  info!(
    project_id = %project_id,
    retention_days,
    deleted_builds = outcome.deleted_builds.len(),
    deleted_tags = outcome.deleted_tags.len(),
    "project purged"
  );
  Ok(())
}

/// Run the sweep for every project on a fixed interval until cancelled.
///
/// The first sweep starts immediately.
pub async fn schedule(services: Arc<Services>, interval: Duration, cancel: CancellationToken) {
  info!(interval_secs = interval.as_secs(), "starting purge scheduler");
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => {
        info!("purge scheduler cancelled");
        break;
      }
      _ = ticker.tick() => {
        let ctx = Context::system(services.clone(), cancel.child_token());
        match run(&ctx, None).await {
          Ok(_) => {}
          Err(CoreError::Cancelled) => {
            info!("purge run cancelled");
          }
          Err(e) => {
            error!(error = %e, "scheduled purge failed");
          }
        }
      }
    }
  }
}
