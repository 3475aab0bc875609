use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ModelError;

/// A flat key/value record as held by the document store.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Encode a record into its document form.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, ModelError> {
  match serde_json::to_value(record)? {
    serde_json::Value::Object(map) => Ok(map),
    other => Err(ModelError::Codec(serde::ser::Error::custom(format!(
      "expected an object, got {other}"
    )))),
  }
}

/// Decode a record from its document form.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, ModelError> {
  Ok(serde_json::from_value(serde_json::Value::Object(document))?)
}
