//! WebSocket Protocol Types
//!
//! Inbound requests arrive as `{type, data}` envelopes; outbound frames are
//! one JSON object per [`ServerMessage`].

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::persona::default_persona;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    pub input_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_persona")]
    pub persona_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiChatRequest {
    pub message: String,
    #[serde(default)]
    pub persona_ids: Vec<String>,
}

/// A parsed inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    OpenAiChat(OpenAiChatRequest),
    Chat(ChatRequest),
    MultiChat(MultiChatRequest),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl ClientRequest {
    /// Parse one inbound text frame.
    ///
    /// The type tag is checked before the payload so an unknown type is
    /// reported as such even when its `data` would not parse.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| RelayError::InvalidMessage(e.to_string()))?;
        let kind = envelope
            .kind
            .ok_or_else(|| RelayError::InvalidMessage("missing field `type`".to_string()))?;
        let data = envelope
            .data
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        match kind.as_str() {
            "openai_chat" => payload(data).map(Self::OpenAiChat),
            "chat" => payload(data).map(Self::Chat),
            "multi_chat" => payload(data).map(Self::MultiChat),
            _ => Err(RelayError::UnsupportedType(kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenAiChat(_) => "openai_chat",
            Self::Chat(_) => "chat",
            Self::MultiChat(_) => "multi_chat",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, RelayError> {
    serde_json::from_value(data).map_err(|e| RelayError::InvalidMessage(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPhase {
    Starting,
    Processing,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completed {
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Failed {
    Error,
}

/// One persona's answer within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaResult {
    pub persona_id: String,
    pub response: String,
    pub response_id: String,
}

/// Payload of the final `response` frame, shaped per request kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Batch {
        responses: Vec<PersonaResult>,
    },
    Direct {
        response: String,
        model: String,
        response_id: String,
    },
    Persona {
        response: String,
        persona_id: String,
        response_id: String,
    },
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        status: StatusPhase,
        message: String,
    },
    Chunk {
        chunk: String,
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        persona_id: Option<String>,
    },
    PersonaResponse {
        persona_id: String,
        response: String,
        response_id: String,
        index: usize,
    },
    Response {
        status: Completed,
        data: ResponseData,
    },
    Error {
        status: Failed,
        message: String,
    },
}

impl ServerMessage {
    pub fn status(status: StatusPhase, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn chunk(chunk: impl Into<String>, persona_id: Option<&str>) -> Self {
        Self::Chunk {
            chunk: chunk.into(),
            is_final: false,
            persona_id: persona_id.map(str::to_string),
        }
    }

    pub fn final_chunk(persona_id: Option<&str>) -> Self {
        Self::Chunk {
            chunk: String::new(),
            is_final: true,
            persona_id: persona_id.map(str::to_string),
        }
    }

    pub fn response(data: ResponseData) -> Self {
        Self::Response {
            status: Completed::Completed,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            status: Failed::Error,
            message: message.into(),
        }
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Chunk { .. } => "chunk",
            Self::PersonaResponse { .. } => "persona_response",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }
}
