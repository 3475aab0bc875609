#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

use vitrine_artifact::MemoryStore as MemoryBlobs;
use vitrine_config::ServiceConfig;
use vitrine_core::{
  Context, Ledger, NewProject, ProcessRequest, ProcessTrigger, ProjectLedger, Services,
  builds_collection,
};
use vitrine_model::Project;
use vitrine_store::{DocumentStore, MemoryStore as MemoryDocuments};

/// Records deferred processing requests instead of running them.
#[derive(Default)]
pub struct RecordingTrigger {
  pub requests: Mutex<Vec<ProcessRequest>>,
}

impl ProcessTrigger for RecordingTrigger {
  fn fire(&self, _services: Arc<Services>, request: ProcessRequest) {
    self.requests.lock().unwrap().push(request);
  }
}

pub struct Harness {
  pub ctx: Context,
  pub documents: Arc<MemoryDocuments>,
  pub blobs: Arc<MemoryBlobs>,
  pub trigger: Arc<RecordingTrigger>,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_config(ServiceConfig::default())
  }

  pub fn with_config(config: ServiceConfig) -> Self {
    let documents = Arc::new(MemoryDocuments::new());
    let blobs = Arc::new(MemoryBlobs::new());
    let trigger = Arc::new(RecordingTrigger::default());
    let services = Services::new(documents.clone(), blobs.clone(), config)
      .with_trigger(trigger.clone());
    let ctx = Context::new(Arc::new(services), CancellationToken::new());

    Self {
      ctx,
      documents,
      blobs,
      trigger,
    }
  }

  pub async fn create_project(&self, id: &str, default_branch: &str) -> Project {
    ProjectLedger::new()
      .create(
        &self.ctx,
        NewProject {
          id: Some(id.to_string()),
          name: id.to_uppercase(),
          git_hub_repository: format!("acme/{id}"),
          git_hub_default_branch: default_branch.to_string(),
          purge_retention_days: Some(30),
          webhooks: vec![],
        },
      )
      .await
      .unwrap()
  }

  /// Move a build's timestamps `days` into the past.
  pub async fn age_build(&self, project_id: &str, build_id: &str, days: i64) {
    let then = (Utc::now() - Duration::days(days)).timestamp_millis();
    let patch = json!({ "createdAt": then, "updatedAt": then });
    self
      .documents
      .update_document(
        &builds_collection(project_id),
        build_id,
        patch.as_object().unwrap().clone(),
      )
      .await
      .unwrap();
  }

  pub fn fired(&self) -> Vec<ProcessRequest> {
    self.trigger.requests.lock().unwrap().clone()
  }
}

/// An uncompressed zip archive holding `files`.
pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
  let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
  let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
  for (path, data) in files {
    writer.start_file(*path, options).unwrap();
    writer.write_all(data).unwrap();
  }
  writer.finish().unwrap().into_inner()
}
