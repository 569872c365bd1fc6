//! Schema models for structured generation.
//!
//! A schema model is a statically declared record description: an ordered
//! list of typed fields plus constraints evaluated generically by the
//! [`Validator`](crate::Validator). The same model also renders the
//! JSON-Schema descriptor handed to the backend for constrained decoding.

mod constraint;
mod field;
mod model;

pub use constraint::{Constraint, ConstraintFn, Violation};
pub use field::{json_kind, FieldSpec, FieldType, Presence};
pub use model::{SchemaBuilder, SchemaError, SchemaModel};
