//! Persona prompt rendering.
//!
//! The persona id and the user message are interpolated verbatim. Callers are
//! trusted to supply both; nothing here escapes or filters them.

pub const DEFAULT_PERSONA: &str = "default";

/// Render the model input for `persona_id` answering `message`.
pub fn persona_prompt(persona_id: &str, message: &str) -> String {
    format!(
        "You are {}, a unique persona with distinct characteristics. Respond in character to this message: {}",
        persona_id, message
    )
}

pub(crate) fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}
