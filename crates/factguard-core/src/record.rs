//! Candidate and validated records.
//!
//! A [`CandidateRecord`] is whatever the parser decoded from the backend
//! payload. A [`ValidatedRecord`] can only be produced by the
//! [`Validator`](crate::Validator); outside this crate it is read-only.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Raw mapping decoded from a backend payload. Not yet validated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateRecord {
    fields: Map<String, Value>,
}

impl CandidateRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wrap a JSON value, returning it back if it is not an object.
    pub fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(other),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// A record that satisfied every constraint of its schema.
///
/// Serializes as the plain field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    schema: String,
    fields: Map<String, Value>,
}

impl ValidatedRecord {
    pub(crate) fn new(schema: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            schema: schema.into(),
            fields,
        }
    }

    /// Name of the schema this record was validated against.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Deserialize into a typed struct (e.g. [`FactCard`](crate::FactCard)).
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value())
    }

    /// Overwrite a declared field. Only the trust policy demotes records.
    ///
    /// Undeclared fields are left absent.
    pub(crate) fn overwrite(&mut self, field: &str, value: Value) {
        if let Some(slot) = self.fields.get_mut(field) {
            *slot = value;
        }
    }
}

impl Serialize for ValidatedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_from_non_object() {
        let result = CandidateRecord::from_value(json!([1, 2]));
        assert_eq!(result.unwrap_err(), json!([1, 2]));
    }

    #[test]
    fn test_overwrite_ignores_undeclared_fields() {
        let fields = json!({"confidence": 0.9}).as_object().cloned().unwrap();
        let mut record = ValidatedRecord::new("t", fields);
        record.overwrite("note", json!("x"));
        record.overwrite("confidence", json!(0.45));
        assert_eq!(record.to_value(), json!({"confidence": 0.45}));
    }

    #[test]
    fn test_serializes_as_plain_mapping() {
        let fields = json!({"title": "Dune", "year": 1965}).as_object().cloned().unwrap();
        let record = ValidatedRecord::new("book_card", fields);
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"title":"Dune","year":1965}"#);
    }
}
