use serde::{Deserialize, Serialize};
use vitrine_config::HookConfig;

use crate::slug::slugify;

/// A project owns builds and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  /// Slug identity. Also the blob container id.
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub git_hub_repository: String,
  pub git_hub_default_branch: String,
  /// Most recent build on the default-branch tag.
  #[serde(default)]
  pub latest_build_id: Option<String>,
  /// Days a build is kept after its last update. Falls back to the service
  /// default when unset.
  #[serde(default)]
  pub purge_retention_days: Option<u32>,
  /// Project-specific webhooks.
  #[serde(default)]
  pub webhooks: Vec<HookConfig>,
}

impl Project {
  /// Identifier of the tag bound to the default branch.
  pub fn default_branch_tag_id(&self) -> String {
    slugify(&self.git_hub_default_branch)
  }

  pub fn is_default_branch_tag(&self, tag_id: &str) -> bool {
    self.default_branch_tag_id() == tag_id
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_branch_tag_id() {
    let project = Project {
      id: "p1".to_string(),
      name: "P1".to_string(),
      git_hub_repository: "org/p1".to_string(),
      git_hub_default_branch: "Main".to_string(),
      latest_build_id: None,
      purge_retention_days: Some(30),
      webhooks: vec![],
    };
    assert_eq!(project.default_branch_tag_id(), "main");
    assert!(project.is_default_branch_tag("main"));
    assert!(!project.is_default_branch_tag("develop"));
  }

  #[test]
  fn test_serialized_field_names() {
    let project: Project = serde_json::from_value(serde_json::json!({
      "id": "p1",
      "name": "P1",
      "gitHubRepository": "org/p1",
      "gitHubDefaultBranch": "main",
      "latestBuildId": null,
    }))
    .unwrap();
    assert_eq!(project.git_hub_repository, "org/p1");
    assert_eq!(project.latest_build_id, None);
    assert_eq!(project.purge_retention_days, None);
  }
}
