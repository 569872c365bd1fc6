//! Field declarations for schema models.

use serde_json::{json, Value};

/// Semantic type of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Any JSON string
    String,

    /// A whole JSON number (`1990` or `1990.0`, never `1990.5`)
    Integer,

    /// Any JSON number
    Float,

    /// An array whose elements are all strings
    StringList,

    /// `null` or the inner type
    Optional(Box<FieldType>),
}

impl FieldType {
    /// Wrap a type so that `null` is also accepted.
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Whether `null` is an acceptable value.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Short type name used in violation messages.
    pub fn type_name(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Float => "number".to_string(),
            FieldType::StringList => "list of strings".to_string(),
            FieldType::Optional(inner) => format!("optional {}", inner.type_name()),
        }
    }

    /// Check a value against this type.
    ///
    /// Returns the human-readable reason on mismatch.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => is_whole_number(value),
            FieldType::Float => value.is_number(),
            FieldType::StringList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            FieldType::Optional(inner) => {
                return if value.is_null() {
                    Ok(())
                } else {
                    inner.check(value)
                };
            }
        };

        if ok {
            Ok(())
        } else {
            Err(format!(
                "expected {}, found {}",
                self.type_name(),
                json_kind(value)
            ))
        }
    }

    /// JSON-Schema fragment for this type.
    pub fn json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({ "type": "string" }),
            FieldType::Integer => json!({ "type": "integer" }),
            FieldType::Float => json!({ "type": "number" }),
            FieldType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldType::Optional(inner) => {
                let mut fragment = inner.json_schema();
                if let Some(kind) = fragment.get("type").cloned() {
                    fragment["type"] = json!([kind, "null"]);
                }
                fragment
            }
        }
    }
}

/// What happens when a field is absent from the candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    /// Absence is a violation (optional types still accept an explicit `null`)
    Required,

    /// Absence materializes this value
    Default(Value),
}

/// A declared field: name, type, presence policy and prompt description.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub presence: Presence,
    pub description: String,
}

impl FieldSpec {
    /// A field that must be present.
    pub fn required(
        name: impl Into<String>,
        ty: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            presence: Presence::Required,
            description: description.into(),
        }
    }

    /// An optional field defaulting to `null`.
    pub fn optional(
        name: impl Into<String>,
        inner: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::optional(inner),
            presence: Presence::Default(Value::Null),
            description: description.into(),
        }
    }

    /// A field that falls back to `default` when absent.
    pub fn with_default(
        name: impl Into<String>,
        ty: FieldType,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            presence: Presence::Default(default),
            description: description.into(),
        }
    }

    /// Whether this field appears in the JSON-Schema `required` list.
    pub fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }
}

/// Integers, plus floats with no fractional part that fit in an `i64`.
fn is_whole_number(value: &Value) -> bool {
    if value.is_i64() || value.is_u64() {
        return true;
    }
    value.as_f64().is_some_and(|n| {
        n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64
    })
}

/// JSON kind name for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_rejects_fractional_numbers() {
        assert!(FieldType::Integer.check(&json!(1998)).is_ok());
        let err = FieldType::Integer.check(&json!(1998.5)).unwrap_err();
        assert!(err.contains("expected integer"));
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        assert!(FieldType::Integer.check(&json!(1998.0)).is_ok());
        assert!(FieldType::Integer.check(&json!(-3.0)).is_ok());
        assert!(FieldType::Integer.check(&json!(1e300)).is_err());
        assert!(FieldType::optional(FieldType::Integer)
            .check(&json!(2001.0))
            .is_ok());
    }

    #[test]
    fn test_float_accepts_integers() {
        assert!(FieldType::Float.check(&json!(1)).is_ok());
        assert!(FieldType::Float.check(&json!(0.25)).is_ok());
        assert!(FieldType::Float.check(&json!("0.25")).is_err());
    }

    #[test]
    fn test_string_list_requires_all_strings() {
        assert!(FieldType::StringList.check(&json!([])).is_ok());
        assert!(FieldType::StringList.check(&json!(["a", "b"])).is_ok());
        assert!(FieldType::StringList.check(&json!(["a", 1])).is_err());
        assert!(FieldType::StringList.check(&json!("a")).is_err());
    }

    #[test]
    fn test_optional_accepts_null() {
        let ty = FieldType::optional(FieldType::Integer);
        assert!(ty.check(&Value::Null).is_ok());
        assert!(ty.check(&json!(3)).is_ok());
        assert!(ty.check(&json!("3")).is_err());
    }

    #[test]
    fn test_optional_json_schema_is_nullable() {
        let schema = FieldType::optional(FieldType::String).json_schema();
        assert_eq!(schema["type"], json!(["string", "null"]));
    }

    #[test]
    fn test_optional_field_defaults_to_null() {
        let field = FieldSpec::optional("note", FieldType::String, "note");
        assert_eq!(field.presence, Presence::Default(Value::Null));
        assert!(!field.is_required());
    }
}
