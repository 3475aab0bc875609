use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::tag_set::{TagSet, delimited};

/// Artifact kinds attached to a build, each uploaded and processed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
  Primary,
  TestReport,
  Coverage,
  Screenshots,
}

impl Variant {
  pub const ALL: [Variant; 4] = [
    Variant::Primary,
    Variant::TestReport,
    Variant::Coverage,
    Variant::Screenshots,
  ];

  /// Name used in storage paths and document keys.
  pub fn as_str(&self) -> &'static str {
    match self {
      Variant::Primary => "primary",
      Variant::TestReport => "testReport",
      Variant::Coverage => "coverage",
      Variant::Screenshots => "screenshots",
    }
  }
}

impl fmt::Display for Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Variant {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Variant::ALL
      .into_iter()
      .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| ModelError::UnsupportedVariant {
        value: s.to_string(),
      })
  }
}

/// Processing state of one variant.
///
/// Moves strictly forward: `none -> uploaded -> processing -> ready`.
/// `processing` may be re-entered when a failed expansion is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantState {
  #[default]
  None,
  Uploaded,
  Processing,
  Ready,
}

impl VariantState {
  pub fn as_str(&self) -> &'static str {
    match self {
      VariantState::None => "none",
      VariantState::Uploaded => "uploaded",
      VariantState::Processing => "processing",
      VariantState::Ready => "ready",
    }
  }

  pub fn can_transition_to(self, next: VariantState) -> bool {
    use VariantState::*;
    matches!(
      (self, next),
      (None, Uploaded) | (Uploaded, Processing) | (Processing, Processing) | (Processing, Ready)
    )
  }
}

impl fmt::Display for VariantState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Per-variant states of a build. Stored flattened into the build document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStates {
  #[serde(default)]
  pub primary: VariantState,
  #[serde(default)]
  pub test_report: VariantState,
  #[serde(default)]
  pub coverage: VariantState,
  #[serde(default)]
  pub screenshots: VariantState,
}

impl VariantStates {
  pub fn get(&self, variant: Variant) -> VariantState {
    match variant {
      Variant::Primary => self.primary,
      Variant::TestReport => self.test_report,
      Variant::Coverage => self.coverage,
      Variant::Screenshots => self.screenshots,
    }
  }

  pub fn set(&mut self, variant: Variant, state: VariantState) {
    let slot = match variant {
      Variant::Primary => &mut self.primary,
      Variant::TestReport => &mut self.test_report,
      Variant::Coverage => &mut self.coverage,
      Variant::Screenshots => &mut self.screenshots,
    };
    *slot = state;
  }
}

/// A versioned artifact bundle, scoped to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
  /// Content version identifier, usually a commit SHA.
  pub id: String,
  #[serde(with = "delimited", default)]
  pub tag_ids: TagSet,
  #[serde(flatten)]
  pub variants: VariantStates,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub author_name: String,
  #[serde(default)]
  pub author_email: String,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub updated_at: DateTime<Utc>,
}

impl Build {
  pub fn state(&self, variant: Variant) -> VariantState {
    self.variants.get(variant)
  }

  /// Blob path of the raw archive for `variant`.
  pub fn archive_path(&self, variant: Variant) -> String {
    archive_path(&self.id, variant)
  }

  /// Blob prefix holding the expanded files of `variant`.
  pub fn variant_prefix(&self, variant: Variant) -> String {
    variant_prefix(&self.id, variant)
  }
}

/// `{buildId}/{variant}.zip`
pub fn archive_path(build_id: &str, variant: Variant) -> String {
  format!("{build_id}/{variant}.zip")
}

/// `{buildId}/{variant}/`
pub fn variant_prefix(build_id: &str, variant: Variant) -> String {
  format!("{build_id}/{variant}/")
}

/// `{buildId}/`
pub fn build_prefix(build_id: &str) -> String {
  format!("{build_id}/")
}
