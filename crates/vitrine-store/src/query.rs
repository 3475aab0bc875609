use std::cmp::Ordering;

use serde_json::Value;

use crate::Document;

/// Predicate over a document's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Eq(String, Value),
  Ne(String, Value),
  Lt(String, Value),
  Gt(String, Value),
  /// The field is a comma-delimited string or an array containing the item.
  ContainsItem(String, String),
  And(Vec<Filter>),
}

impl Filter {
  pub fn eq(field: &str, value: impl Into<Value>) -> Self {
    Filter::Eq(field.to_string(), value.into())
  }

  pub fn ne(field: &str, value: impl Into<Value>) -> Self {
    Filter::Ne(field.to_string(), value.into())
  }

  pub fn lt(field: &str, value: impl Into<Value>) -> Self {
    Filter::Lt(field.to_string(), value.into())
  }

  pub fn gt(field: &str, value: impl Into<Value>) -> Self {
    Filter::Gt(field.to_string(), value.into())
  }

  pub fn contains_item(field: &str, item: &str) -> Self {
    Filter::ContainsItem(field.to_string(), item.to_string())
  }

  pub fn matches(&self, document: &Document) -> bool {
    let null = Value::Null;
    let field = |name: &str| document.get(name).unwrap_or(&null);

    match self {
      Filter::Eq(name, value) => field(name) == value,
      Filter::Ne(name, value) => field(name) != value,
      Filter::Lt(name, value) => compare(field(name), value) == Some(Ordering::Less),
      Filter::Gt(name, value) => compare(field(name), value) == Some(Ordering::Greater),
      Filter::ContainsItem(name, item) => match field(name) {
        Value::String(s) => s.split(',').any(|part| part.trim() == item),
        Value::Array(items) => items.iter().any(|v| v.as_str() == Some(item)),
        _ => false,
      },
      Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
    }
  }
}

/// Sort order on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
  pub field: String,
  pub descending: bool,
}

/// Filter, sort and limit for listing documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
  pub filter: Option<Filter>,
  pub sort: Vec<Sort>,
  pub limit: Option<usize>,
}

impl Query {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(match self.filter.take() {
      Some(Filter::And(mut filters)) => {
        filters.push(filter);
        Filter::And(filters)
      }
      Some(existing) => Filter::And(vec![existing, filter]),
      None => filter,
    });
    self
  }

  pub fn sort_asc(mut self, field: &str) -> Self {
    self.sort.push(Sort {
      field: field.to_string(),
      descending: false,
    });
    self
  }

  pub fn sort_desc(mut self, field: &str) -> Self {
    self.sort.push(Sort {
      field: field.to_string(),
      descending: true,
    });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  /// Evaluate this query over an unordered set of documents.
  pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
    let mut matched: Vec<Document> = documents
      .into_iter()
      .filter(|doc| self.filter.as_ref().is_none_or(|f| f.matches(doc)))
      .collect();

    if !self.sort.is_empty() {
      matched.sort_by(|a, b| {
        for sort in &self.sort {
          let ordering = compare_for_sort(a.get(&sort.field), b.get(&sort.field));
          let ordering = if sort.descending {
            ordering.reverse()
          } else {
            ordering
          };
          if ordering != Ordering::Equal {
            return ordering;
          }
        }
        Ordering::Equal
      });
    }

    if let Some(limit) = self.limit {
      matched.truncate(limit);
    }
    matched
  }
}

/// Numbers compare numerically, strings lexically, anything else is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    _ => None,
  }
}

// Missing or incomparable values sort last.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}
