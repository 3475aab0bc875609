use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use vitrine_artifact::FsStore;
use vitrine_config::ServiceConfig;
use vitrine_core::{
  Archive, BuildLedger, Context, Ledger, NewBuild, NewProject, ProjectLedger, Services, TagLedger,
  process_variant, purge,
};
use vitrine_model::Variant;
use vitrine_store::{Filter, Query, SqliteStore};

/// Vitrine - build artifact catalog with archive ingestion and purging
#[derive(Parser)]
#[command(name = "vitrine")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.vitrine)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage projects
  Project {
    #[command(subcommand)]
    action: ProjectAction,
  },

  /// Manage builds of a project
  Build {
    #[command(subcommand)]
    action: BuildAction,
  },

  /// Manage tags of a project
  Tag {
    #[command(subcommand)]
    action: TagAction,
  },

  /// Upload a zip archive for a build variant
  Upload {
    project: String,
    build: String,
    /// Path to the zip archive
    archive: PathBuf,
    #[arg(long, default_value = "primary")]
    variant: String,
  },

  /// Expand an uploaded archive (also retries a failed expansion)
  Process {
    project: String,
    build: String,
    #[arg(long, default_value = "primary")]
    variant: String,
  },

  /// Delete expired builds and unused tags
  Purge {
    /// Only purge this project
    #[arg(long)]
    project: Option<String>,

    /// Keep running and purge on the configured interval
    #[arg(long)]
    watch: bool,
  },
}

#[derive(Subcommand)]
enum ProjectAction {
  Create {
    /// Project id (slugified)
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value = "main")]
    default_branch: String,
    #[arg(long, default_value = "")]
    repository: String,
    #[arg(long)]
    retention_days: Option<u32>,
  },
  List,
  Delete {
    id: String,
  },
}

#[derive(Subcommand)]
enum BuildAction {
  Create {
    project: String,
    id: String,
    /// Tag specifier (`value`, `value;type` or `value;type;display`), repeatable
    #[arg(long = "tag", required = true)]
    tags: Vec<String>,
    #[arg(long, default_value = "")]
    message: String,
    #[arg(long, default_value = "")]
    author_name: String,
    #[arg(long, default_value = "")]
    author_email: String,
  },
  List {
    project: String,
    /// Only builds carrying this tag id
    #[arg(long)]
    tag: Option<String>,
  },
  Delete {
    project: String,
    id: String,
  },
  /// List the stories published by a build
  Stories {
    project: String,
    id: String,
  },
}

#[derive(Subcommand)]
enum TagAction {
  List { project: String },
  Delete { project: String, id: String },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".vitrine"),
  };

  match cli.command {
    Some(command) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(command, data_dir).await })
    }
    None => {
      println!("vitrine - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = || {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
  };
  if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
    tracing_subscriber::fmt()
      .json()
      .with_env_filter(filter())
      .with_writer(std::io::stderr)
      .init();
  } else {
    tracing_subscriber::fmt()
      .with_env_filter(filter())
      .with_writer(std::io::stderr)
      .init();
  }
}

async fn open_services(data_dir: &Path) -> Result<Arc<Services>> {
  tracing::debug!(data_dir = %data_dir.display(), "opening data directory");
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let config = ServiceConfig::load(&data_dir.join("config.json")).context("failed to load configuration")?;

  let options = SqliteConnectOptions::new()
    .filename(data_dir.join("vitrine.db"))
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .context("failed to open document store")?;
  let documents = SqliteStore::new(pool);
  documents
    .migrate()
    .await
    .context("failed to migrate document store")?;

  let blobs = FsStore::new(data_dir.join("blobs"));
  Ok(Arc::new(Services::new(
    Arc::new(documents),
    Arc::new(blobs),
    config,
  )))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn parse_variant(variant: &str) -> Result<Variant> {
  variant
    .parse()
    .with_context(|| format!("unknown variant: {variant}"))
}

async fn run(command: Commands, data_dir: PathBuf) -> Result<()> {
  let services = open_services(&data_dir).await?;
  let cancel = CancellationToken::new();
  let ctx = Context::system(services.clone(), cancel.clone());
  ProjectLedger::new()
    .bootstrap(&ctx)
    .await
    .context("failed to prepare document store")?;

  match command {
    Commands::Project { action } => run_project(&ctx, action).await,
    Commands::Build { action } => run_build(&ctx, action).await,
    Commands::Tag { action } => run_tag(&ctx, action).await,
    Commands::Upload {
      project,
      build,
      archive,
      variant,
    } => {
      let variant = parse_variant(&variant)?;
      let file = tokio::fs::File::open(&archive)
        .await
        .with_context(|| format!("failed to open archive: {}", archive.display()))?;
      let size = file.metadata().await?.len();
      let body = ReaderStream::new(file)
        .map_err(vitrine_artifact::Error::Io)
        .boxed();

      let outcome = BuildLedger::new(&project)
        .upload(&ctx, &build, variant, Archive::new(body, Some(size)))
        .await
        .context("upload failed")?;
      eprintln!("Upload mode: {:?}", outcome.mode);
      print_json(&outcome.build)
    }
    Commands::Process {
      project,
      build,
      variant,
    } => {
      let variant = parse_variant(&variant)?;
      let build = process_variant(&ctx, &project, &build, variant)
        .await
        .context("processing failed")?;
      print_json(&build)
    }
    Commands::Purge { project, watch } => {
      if watch {
        let interval = Duration::from_secs(services.config.purge.interval_secs.max(1));
        let scheduler = tokio::spawn(purge::schedule(services.clone(), interval, cancel.clone()));
        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        scheduler.await?;
        return Ok(());
      }

      let report = purge::run(&ctx, project.as_deref())
        .await
        .context("purge failed")?;
      for outcome in &report.projects {
        match &outcome.error {
          Some(error) => eprintln!("{}: failed: {error}", outcome.project_id),
          None => eprintln!(
            "{}: deleted {} builds, {} tags",
            outcome.project_id,
            outcome.deleted_builds.len(),
            outcome.deleted_tags.len()
          ),
        }
      }
      Ok(())
    }
  }
}

async fn run_project(ctx: &Context, action: ProjectAction) -> Result<()> {
  let projects = ProjectLedger::new();
  match action {
    ProjectAction::Create {
      id,
      name,
      default_branch,
      repository,
      retention_days,
    } => {
      let project = projects
        .create(
          ctx,
          NewProject {
            name: name.unwrap_or_else(|| id.clone()),
            id: Some(id),
            git_hub_repository: repository,
            git_hub_default_branch: default_branch,
            purge_retention_days: retention_days,
            webhooks: Vec::new(),
          },
        )
        .await
        .context("failed to create project")?;
      print_json(&project)
    }
    ProjectAction::List => print_json(&projects.list(ctx, Query::new().sort_asc("id")).await?),
    ProjectAction::Delete { id } => {
      projects
        .delete(ctx, &id)
        .await
        .with_context(|| format!("failed to delete project '{id}'"))?;
      eprintln!("Deleted project {id}");
      Ok(())
    }
  }
}

async fn run_build(ctx: &Context, action: BuildAction) -> Result<()> {
  match action {
    BuildAction::Create {
      project,
      id,
      tags,
      message,
      author_name,
      author_email,
    } => {
      let build = BuildLedger::new(&project)
        .create(
          ctx,
          NewBuild {
            id,
            tags,
            message,
            author_name,
            author_email,
          },
        )
        .await
        .context("failed to create build")?;
      print_json(&build)
    }
    BuildAction::List { project, tag } => {
      let mut query = Query::new().sort_desc("createdAt");
      if let Some(tag) = tag {
        query = query.filter(Filter::contains_item("tagIds", &tag));
      }
      print_json(&BuildLedger::new(&project).list(ctx, query).await?)
    }
    BuildAction::Delete { project, id } => {
      BuildLedger::new(&project)
        .delete(ctx, &id)
        .await
        .with_context(|| format!("failed to delete build '{id}'"))?;
      eprintln!("Deleted build {id}");
      Ok(())
    }
    BuildAction::Stories { project, id } => {
      let builds = BuildLedger::new(&project);
      let build = builds.get(ctx, &id).await?;
      match builds.get_stories(ctx, &build).await {
        Some(stories) => print_json(&stories),
        None => {
          eprintln!("No stories available for build {id}");
          Ok(())
        }
      }
    }
  }
}

async fn run_tag(ctx: &Context, action: TagAction) -> Result<()> {
  match action {
    TagAction::List { project } => {
      print_json(&TagLedger::new(&project).list(ctx, Query::new().sort_asc("id")).await?)
    }
    TagAction::Delete { project, id } => {
      TagLedger::new(&project)
        .delete(ctx, &id)
        .await
        .with_context(|| format!("failed to delete tag '{id}'"))?;
      eprintln!("Deleted tag {id}");
      Ok(())
    }
  }
}
