use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Whether an index entry is a rendered story or a docs page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
  Story,
  Docs,
}

/// One entry of a built site's story index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDescriptor {
  pub id: String,
  pub title: String,
  pub name: String,
  pub import_path: String,
  pub kind: StoryKind,
  pub tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
  #[serde(default)]
  entries: Option<BTreeMap<String, RawEntry>>,
  #[serde(default)]
  stories: Option<BTreeMap<String, RawEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
  id: Option<String>,
  title: Option<String>,
  /// Legacy manifests use `kind` for the title and `story` for the name.
  kind: Option<String>,
  name: Option<String>,
  story: Option<String>,
  #[serde(default)]
  import_path: String,
  #[serde(rename = "type")]
  entry_type: Option<String>,
  #[serde(default)]
  tags: Vec<String>,
}

/// Parse an `index.json` (entries) or legacy `stories.json` (stories)
/// manifest into a flat, id-ordered list.
pub fn parse_story_manifest(bytes: &[u8]) -> Result<Vec<StoryDescriptor>, ModelError> {
  let manifest: RawManifest = serde_json::from_slice(bytes)?;
  let entries = manifest
    .entries
    .or(manifest.stories)
    .ok_or_else(|| ModelError::InvalidManifest {
      message: "manifest has neither 'entries' nor 'stories'".to_string(),
    })?;

  Ok(
    entries
      .into_iter()
      .map(|(key, raw)| {
        let kind = match raw.entry_type.as_deref() {
          Some("docs") => StoryKind::Docs,
          _ => StoryKind::Story,
        };
        StoryDescriptor {
          id: raw.id.unwrap_or(key),
          title: raw.title.or(raw.kind).unwrap_or_default(),
          name: raw.name.or(raw.story).unwrap_or_default(),
          import_path: raw.import_path,
          kind,
          tags: raw.tags,
        }
      })
      .collect(),
  )
}
