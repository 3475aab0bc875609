use serde::{Deserialize, Serialize};

/// Delimiter used when a [`TagSet`] is stored as a single string.
pub const TAG_DELIMITER: &str = ",";

/// Ordered, de-duplicated set of tag identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(Vec<String>);

impl TagSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Decode the delimited storage form. Empty items are skipped.
  pub fn parse(encoded: &str) -> Self {
    encoded
      .split(TAG_DELIMITER)
      .map(str::trim)
      .filter(|id| !id.is_empty())
      .collect()
  }

  /// Encode to the delimited storage form.
  pub fn to_delimited(&self) -> String {
    self.0.join(TAG_DELIMITER)
  }

  /// Insert `id` unless present. Returns whether it was added.
  pub fn insert(&mut self, id: impl Into<String>) -> bool {
    let id = id.into();
    if id.is_empty() || self.contains(&id) {
      return false;
    }
    self.0.push(id);
    true
  }

  pub fn remove(&mut self, id: &str) -> bool {
    let before = self.0.len();
    self.0.retain(|existing| existing != id);
    self.0.len() != before
  }

  /// Copy of this set without `id`.
  pub fn without(&self, id: &str) -> Self {
    let mut next = self.clone();
    next.remove(id);
    next
  }

  pub fn contains(&self, id: &str) -> bool {
    self.0.iter().any(|existing| existing == id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut set = TagSet::new();
    for id in iter {
      set.insert(id);
    }
    set
  }
}

impl<'a> IntoIterator for &'a TagSet {
  type Item = &'a String;
  type IntoIter = std::slice::Iter<'a, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// Serde adapter storing a [`TagSet`] as its delimited string.
pub(crate) mod delimited {
  use serde::{Deserialize, Deserializer, Serializer};

  use super::TagSet;

  pub fn serialize<S: Serializer>(set: &TagSet, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&set.to_delimited())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TagSet, D::Error> {
    let encoded = Option::<String>::deserialize(deserializer)?;
    Ok(encoded.as_deref().map(TagSet::parse).unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_insert_deduplicates_and_keeps_order() {
    let set: TagSet = ["main", "feature-x", "main", "", "pr-1"].into_iter().collect();
    assert_eq!(set.iter().collect::<Vec<_>>(), vec!["main", "feature-x", "pr-1"]);
  }

  #[test]
  fn test_parse_delimited() {
    let set = TagSet::parse("main, feature-x,,main");
    assert_eq!(set.len(), 2);
    assert_eq!(set.to_delimited(), "main,feature-x");
  }

  #[test]
  fn test_parse_empty() {
    assert!(TagSet::parse("").is_empty());
  }

  #[test]
  fn test_without() {
    let set = TagSet::parse("a,b,c");
    let next = set.without("b");
    assert_eq!(next.to_delimited(), "a,c");
    assert!(set.contains("b"));
  }
}
