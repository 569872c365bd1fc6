//! The schema model: an ordered field list plus constraints.

use std::collections::HashSet;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::constraint::{Constraint, Violation};
use super::field::{FieldSpec, FieldType, Presence};

/// Errors raised while declaring a schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Subject field '{0}' is not declared")]
    UnknownSubject(String),

    #[error("Constraint '{rule}' references undeclared field '{field}'")]
    UnknownConstraintField { rule: String, field: String },

    #[error("Default for '{field}' does not match its type: {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("Schema has no fields")]
    Empty,
}

/// Declarative description of the expected structured result.
///
/// Evaluation order is fixed: per-field presence and type checks in
/// declaration order, then constraints in declaration order.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    name: String,
    description: String,
    subject_field: String,
    fields: Vec<FieldSpec>,
    constraints: Vec<Constraint>,
}

impl SchemaModel {
    /// Start declaring a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Field that echoes the caller's query in safe defaults (`claim`, `title`).
    pub fn subject_field(&self) -> &str {
        &self.subject_field
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Assemble the candidate against the declared fields and evaluate
    /// every constraint.
    ///
    /// On success the returned map holds exactly the declared fields, in
    /// declaration order, with defaults materialized for absent ones.
    /// Present values are copied unchanged.
    pub fn check(
        &self,
        candidate: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<Violation>> {
        let mut assembled = Map::new();
        let mut violations = Vec::new();
        let mut mistyped = HashSet::new();

        for field in &self.fields {
            match (candidate.get(&field.name), &field.presence) {
                (Some(value), _) => {
                    if let Err(reason) = field.ty.check(value) {
                        violations.push(Violation::new(field.name.as_str(), "type", reason));
                        mistyped.insert(field.name.as_str());
                    }
                    assembled.insert(field.name.clone(), value.clone());
                }
                (None, Presence::Default(default)) => {
                    assembled.insert(field.name.clone(), default.clone());
                }
                (None, Presence::Required) => {
                    violations.push(Violation::new(
                        field.name.as_str(),
                        "required",
                        "field required",
                    ));
                    mistyped.insert(field.name.as_str());
                }
            }
        }

        for constraint in &self.constraints {
            if constraint.fields().iter().any(|f| mistyped.contains(f)) {
                continue;
            }
            if let Err(violation) = constraint.evaluate(&assembled) {
                violations.push(violation);
            }
        }

        if violations.is_empty() {
            Ok(assembled)
        } else {
            Err(violations)
        }
    }

    /// JSON-Schema object descriptor, used as the tool parameters for
    /// constrained decoding.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut fragment = field.ty.json_schema();
            fragment["description"] = json!(field.description);
            if let Presence::Default(default) = &field.presence {
                fragment["default"] = default.clone();
            }
            for constraint in &self.constraints {
                if let Constraint::Range { field: target, min, max } = constraint {
                    if *target == field.name {
                        fragment["minimum"] = json!(min);
                        fragment["maximum"] = json!(max);
                    }
                }
            }
            properties.insert(field.name.clone(), fragment);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "title": self.name,
            "description": self.description,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Builder for [`SchemaModel`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    description: String,
    subject_field: Option<String>,
    fields: Vec<FieldSpec>,
    constraints: Vec<Constraint>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            subject_field: None,
            fields: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Name the subject field. Defaults to the first declared field.
    pub fn subject(mut self, field: impl Into<String>) -> Self {
        self.subject_field = Some(field.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn required(
        self,
        name: impl Into<String>,
        ty: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.field(FieldSpec::required(name, ty, description))
    }

    pub fn optional(
        self,
        name: impl Into<String>,
        inner: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.field(FieldSpec::optional(name, inner, description))
    }

    pub fn with_default(
        self,
        name: impl Into<String>,
        ty: FieldType,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        self.field(FieldSpec::with_default(name, ty, default, description))
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate the declaration and build the model.
    pub fn build(self) -> Result<SchemaModel, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            if let Presence::Default(default) = &field.presence {
                field.ty.check(default).map_err(|reason| SchemaError::InvalidDefault {
                    field: field.name.clone(),
                    reason,
                })?;
            }
        }

        for constraint in &self.constraints {
            for field in constraint.fields() {
                if !seen.contains(field) {
                    return Err(SchemaError::UnknownConstraintField {
                        rule: constraint.rule_name().to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        let subject_field = match self.subject_field {
            Some(subject) if seen.contains(subject.as_str()) => subject,
            Some(subject) => return Err(SchemaError::UnknownSubject(subject)),
            None => self.fields[0].name.clone(),
        };

        Ok(SchemaModel {
            name: self.name,
            description: self.description,
            subject_field,
            fields: self.fields,
            constraints: self.constraints,
        })
    }
}
