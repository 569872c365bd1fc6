//! Built-in schema models and their typed counterparts.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::schema::{Constraint, FieldType, SchemaModel};

/// Upper bound for plausible years.
pub const MAX_PLAUSIBLE_YEAR: i64 = 2100;

/// A short, verifiable factual claim with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCard {
    pub claim: String,
    pub provenance: Option<String>,
    #[serde(default, with = "whole_number::optional")]
    pub year: Option<i64>,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    pub note: Option<String>,
}

/// A structured datasheet for a (possibly fictional) book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCard {
    pub title: String,
    pub author: String,
    #[serde(with = "whole_number")]
    pub year_publication: i64,
    pub genre: String,
    pub short_summary: String,
}

/// Integer fields accept whole floats (`1998.0`) the way the validator does.
mod whole_number {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        to_i64(&Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }

    fn to_i64(value: &Value) -> Result<i64, String> {
        if let Some(n) = value.as_i64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 => {
                Ok(n as i64)
            }
            _ => Err(format!("expected a whole number, found {}", value)),
        }
    }

    pub mod optional {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<i64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(n) => serializer.serialize_some(n),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<i64>, D::Error> {
            match Value::deserialize(deserializer)? {
                Value::Null => Ok(None),
                value => to_i64(&value).map(Some).map_err(D::Error::custom),
            }
        }
    }
}

/// Schema for [`FactCard`].
///
/// `sources` must be non-empty whenever `confidence > 0.5`.
pub fn fact_card() -> SchemaModel {
    SchemaModel::builder("fact_card")
        .description("Tool that produces FactCard objects in JSON.")
        .subject("claim")
        .required("claim", FieldType::String, "A short, verifiable factual claim.")
        .optional(
            "provenance",
            FieldType::String,
            "Brief description of how the statement was obtained (e.g., 'Wikipedia', 'Report X').",
        )
        .optional("year", FieldType::Integer, "Year related to the claim, if applicable.")
        .required(
            "confidence",
            FieldType::Float,
            "Confidence estimated by the model (0.0 to 1.0).",
        )
        .with_default(
            "sources",
            FieldType::StringList,
            json!([]),
            "URLs or short references that support the claim. Required if confidence > 0.5.",
        )
        .optional(
            "note",
            FieldType::String,
            "If the model doesn't know, it should put 'unknown' here and low confidence.",
        )
        .constraint(Constraint::range("year", 0.0, MAX_PLAUSIBLE_YEAR as f64))
        .constraint(Constraint::range("confidence", 0.0, 1.0))
        .constraint(Constraint::non_empty_when_above("sources", "confidence", 0.5))
        .build()
        .expect("Invalid fact_card schema declaration")
}

/// Schema for [`BookCard`]. Every field is required.
pub fn book_card() -> SchemaModel {
    SchemaModel::builder("book_card")
        .description("Generates a complete, structured data sheet for a fictional book.")
        .subject("title")
        .required("title", FieldType::String, "The full title of the book.")
        .required("author", FieldType::String, "The author's full name.")
        .required(
            "year_publication",
            FieldType::Integer,
            "The year the book was originally published.",
        )
        .required("genre", FieldType::String, "The literary genre of the book.")
        .required("short_summary", FieldType::String, "A one-sentence summary of the book.")
        .build()
        .expect("Invalid book_card schema declaration")
}
