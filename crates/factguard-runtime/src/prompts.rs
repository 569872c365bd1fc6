//! Prompt composition for schema-constrained generation.
//!
//! Every request carries exactly one system instruction followed by one
//! task instruction. The system instruction is assembled from fixed policy
//! blocks plus the schema's field list, so the same schema and mode always
//! produce the same bytes.

use std::fmt::Write as _;

use factguard_core::{FieldType, Role, SchemaModel, TrustPolicy, Turn, UNKNOWN_NOTE};

use crate::config::GenerationMode;
use crate::providers::ChatMessage;

/// Persona for factual records.
pub const FACTUAL_PERSONA: &str =
    "You are a factual assistant. Always respond strictly in JSON, following the provided schema.";

/// Persona for creative records.
pub const CREATIVE_PERSONA: &str =
    "You are a wizard that generates structured datasheets. Your output should ALWAYS be JSON that matches the provided schema.";

/// Closing policy shared by both personas.
pub const JSON_ONLY_POLICY: &str = "- Do not provide explanations outside of JSON.";

/// Builds the messages for one generation request.
#[derive(Debug, Clone, Copy)]
pub struct PromptComposer<'a> {
    schema: &'a SchemaModel,
    policy: &'a TrustPolicy,
    mode: GenerationMode,
}

impl<'a> PromptComposer<'a> {
    pub fn new(schema: &'a SchemaModel, policy: &'a TrustPolicy, mode: GenerationMode) -> Self {
        Self {
            schema,
            policy,
            mode,
        }
    }

    /// Role, uncertainty protocol, no-fabrication rule, JSON-only rule, and
    /// the field list.
    pub fn system_instruction(&self) -> String {
        let mut out = String::new();

        out.push_str(match self.mode {
            GenerationMode::Factual => FACTUAL_PERSONA,
            GenerationMode::Creative => CREATIVE_PERSONA,
        });
        out.push('\n');

        let confidence = self.schema.field(&self.policy.confidence_field).is_some();
        let note = self.schema.field(&self.policy.note_field).is_some();
        let sources = self.schema.field(&self.policy.sources_field).is_some();

        if confidence && note {
            let _ = writeln!(
                out,
                "- If the information is uncertain, put \"{}\" in the '{}' field and set {} <= {}. Never signal uncertainty by leaving fields out.",
                UNKNOWN_NOTE,
                self.policy.note_field,
                self.policy.confidence_field,
                self.policy.acceptance_threshold
            );
        }

        if sources {
            let _ = writeln!(
                out,
                "- NEVER invent source names or URLs. If there is no source, leave '{}' empty{}.",
                self.policy.sources_field,
                if confidence {
                    format!(" and {} low", self.policy.confidence_field)
                } else {
                    String::new()
                }
            );
        }

        out.push_str(JSON_ONLY_POLICY);
        out.push('\n');

        let _ = writeln!(out, "\nFields of '{}':", self.schema.name());
        for field in self.schema.fields() {
            let _ = writeln!(
                out,
                "- {} ({}{}): {}",
                field.name,
                type_label(&field.ty),
                if field.is_required() { ", required" } else { "" },
                field.description
            );
        }

        out
    }

    /// The user-side request embedding `query`.
    pub fn task_instruction(&self, query: &str) -> String {
        match self.mode {
            GenerationMode::Factual => format!(
                "Please generate a verifiable JSON object about: {}. Return only JSON.",
                query
            ),
            GenerationMode::Creative => format!(
                "Generate a fictitious {} on the topic: {}",
                self.schema.name().replace('_', " "),
                query
            ),
        }
    }

    /// System instruction, then prior non-system turns, then the task.
    ///
    /// System turns in `history` are skipped; the composed instruction
    /// replaces them.
    pub fn compose(&self, history: &[Turn], query: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_instruction()));
        messages.extend(
            history
                .iter()
                .filter(|turn| turn.role != Role::System)
                .map(ChatMessage::from),
        );
        messages.push(ChatMessage::user(self.task_instruction(query)));
        messages
    }
}

fn type_label(ty: &FieldType) -> String {
    match ty {
        FieldType::Optional(inner) => format!("{}, optional", type_label(inner)),
        other => other.type_name(),
    }
}
