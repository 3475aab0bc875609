use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::slug::slugify;

static TICKET: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*-\d+$").expect("valid regex"));

/// Kind of label a tag represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
  Branch,
  Pr,
  Ticket,
}

impl TagType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TagType::Branch => "branch",
      TagType::Pr => "pr",
      TagType::Ticket => "ticket",
    }
  }

  /// Guess the type from the shape of a tag value.
  ///
  /// Purely numeric values are pull requests, `word-number` values
  /// (`JIRA-123`) are tickets, everything else is a branch.
  pub fn infer(value: &str) -> Self {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
      TagType::Pr
    } else if TICKET.is_match(value) {
      TagType::Ticket
    } else {
      TagType::Branch
    }
  }
}

impl fmt::Display for TagType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TagType {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "branch" => Ok(TagType::Branch),
      "pr" => Ok(TagType::Pr),
      "ticket" => Ok(TagType::Ticket),
      other => Err(ModelError::UnsupportedTagType {
        value: other.to_string(),
      }),
    }
  }
}

/// A tag record, scoped to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
  /// Slug of the tag value.
  pub id: String,
  #[serde(rename = "type")]
  pub tag_type: TagType,
  /// Display value.
  pub value: String,
  /// Number of builds whose tag list contains this tag.
  #[serde(default)]
  pub builds_count: u64,
  #[serde(default)]
  pub latest_build_id: Option<String>,
}

/// Compact tag reference supplied when creating a build.
///
/// Accepted forms are `value`, `value;type` and `value;type;displayValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpecifier {
  pub value: String,
  pub tag_type: Option<TagType>,
  pub display_value: Option<String>,
}

impl TagSpecifier {
  /// Parse a specifier. Unknown type names fall back to inference.
  pub fn parse(specifier: &str) -> Self {
    let mut parts = specifier.splitn(3, ';');
    let value = parts.next().unwrap_or_default().trim().to_string();
    let tag_type = parts
      .next()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .and_then(|t| t.parse().ok());
    let display_value = parts
      .next()
      .map(str::trim)
      .filter(|d| !d.is_empty())
      .map(str::to_string);

    Self {
      value,
      tag_type,
      display_value,
    }
  }

  /// Tag identifier derived from the value.
  pub fn id(&self) -> String {
    slugify(&self.value)
  }

  pub fn resolved_type(&self) -> TagType {
    self
      .tag_type
      .unwrap_or_else(|| TagType::infer(&self.value))
  }

  pub fn display(&self) -> &str {
    self.display_value.as_deref().unwrap_or(&self.value)
  }
}
