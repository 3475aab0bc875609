//! Vitrine Core
//!
//! The artifact ingestion and lifecycle pipeline:
//!
//! - [`ProjectLedger`], [`TagLedger`] and [`BuildLedger`] own the records and
//!   keep derived state (tag build counts, latest build pointers) in step
//! - [`pipeline`] accepts archive uploads, stores the raw archive and either
//!   expands it inline or defers expansion to a [`ProcessTrigger`]
//! - [`purge`] reclaims builds past their retention window and tags nothing
//!   refers to anymore
//!
//! Every operation takes an explicit [`Context`] carrying the cancellation
//! token, the shared [`Services`] and the resolved user. There is no ambient
//! state.

mod build;
mod context;
mod error;
mod helper;
mod ledger;
mod project;
mod tag;

pub mod pipeline;
pub mod purge;

pub use build::{BuildLedger, BuildPatch, NewBuild};
pub use context::{AccessPolicy, Action, AllowAll, Context, Services, User};
pub use error::{CoreError, ErrorResponse};
pub use helper::{LedgerHelper, best_effort, builds_collection, projects_collection, tags_collection};
pub use ledger::Ledger;
pub use pipeline::{
  Archive, ArchiveUpload, HttpProcessTrigger, LocalProcessTrigger, ProcessRequest, ProcessTrigger,
  ProcessingMode, UploadOutcome, UploadRequest, process_variant, read_archive_upload,
  upload_archive,
};
pub use project::{NewProject, ProjectLedger, ProjectPatch};
pub use purge::{ProjectPurge, PurgeReport};
pub use tag::{NewTag, TagLedger, TagPatch};
