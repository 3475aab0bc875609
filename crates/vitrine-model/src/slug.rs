use std::sync::LazyLock;

use regex::Regex;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Derive a tag identifier from a display value.
///
/// Lowercases, trims, and collapses every run of non-word characters into a
/// single hyphen. Leading and trailing hyphens are dropped. Applying it twice
/// yields the same result as applying it once.
///
/// ```
/// assert_eq!(vitrine_model::slugify("  Feature/Login Page "), "feature-login-page");
/// ```
pub fn slugify(value: &str) -> String {
  let lowered = value.trim().to_lowercase();
  NON_WORD
    .replace_all(&lowered, "-")
    .trim_matches('-')
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_slugify_basic() {
    assert_eq!(slugify("main"), "main");
    assert_eq!(slugify("Feature X"), "feature-x");
    assert_eq!(slugify("feature/foo--bar"), "feature-foo-bar");
    assert_eq!(slugify("  JIRA-123  "), "jira-123");
    assert_eq!(slugify("release/1.2.3"), "release-1-2-3");
  }

  #[test]
  fn test_slugify_keeps_underscores() {
    assert_eq!(slugify("snake_case_branch"), "snake_case_branch");
  }

  #[test]
  fn test_slugify_edge_cases() {
    assert_eq!(slugify(""), "");
    assert_eq!(slugify("!!!"), "");
    assert_eq!(slugify("-a-"), "a");
  }

  #[test]
  fn test_slugify_idempotent() {
    let samples = [
      "main",
      "Feature X",
      "  feature/foo--bar ",
      "JIRA-123",
      "release/1.2.3",
      "Ünïcode Bränch",
      "a!",
      "--leading and trailing--",
      "tabs\tand\nnewlines",
      "42",
    ];
    for value in samples {
      let once = slugify(value);
      assert_eq!(slugify(&once), once, "slugify not idempotent for {value:?}");
    }
  }
}
