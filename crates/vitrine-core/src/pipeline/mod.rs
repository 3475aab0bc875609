//! Archive ingestion.
//!
//! An upload stores the raw archive at `{buildId}/{variant}.zip` and marks
//! the variant `uploaded`. Small archives are then expanded within the same
//! call; larger ones are handed to a [`ProcessTrigger`] when queued
//! processing is enabled, or left for an explicit [`process_variant`] call.

mod decompress;
mod request;
mod trigger;
mod upload;

pub use decompress::process_variant;
pub use request::{ArchiveUpload, UploadRequest, read_archive_upload};
pub use trigger::{HttpProcessTrigger, LocalProcessTrigger, ProcessRequest, ProcessTrigger};
pub use upload::{Archive, ProcessingMode, UploadOutcome, upload_archive};
