//! Non-streaming request/response endpoints.
//!
//! These never fail at the HTTP level: upstream problems come back as
//! `"Error: ..."` text in the `response` field.

use axum::{Json, extract::State, response::IntoResponse};
use responses_stream::non_streaming_text;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::persona::{default_persona, persona_prompt};

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default = "default_persona")]
    pub persona_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub persona_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MultiBody {
    pub message: String,
    pub persona_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MultiReply {
    pub responses: Vec<ChatReply>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiChatBody {
    pub input_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAiChatReply {
    pub response: String,
    pub model: String,
}

pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Persona Relay API is running" }))
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Json<ChatReply> {
    let prompt = persona_prompt(&body.persona_id, &body.message);
    let response = non_streaming_text(state.upstream.as_ref(), &prompt, None).await;
    Json(ChatReply {
        response,
        persona_id: body.persona_id,
    })
}

pub async fn multi_handler(
    State(state): State<AppState>,
    Json(body): Json<MultiBody>,
) -> Json<MultiReply> {
    let mut responses = Vec::with_capacity(body.persona_ids.len());
    for persona_id in body.persona_ids {
        let prompt = persona_prompt(&persona_id, &body.message);
        let response = non_streaming_text(state.upstream.as_ref(), &prompt, None).await;
        responses.push(ChatReply {
            response,
            persona_id,
        });
    }
    Json(MultiReply { responses })
}

pub async fn openai_chat_handler(
    State(state): State<AppState>,
    Json(body): Json<OpenAiChatBody>,
) -> Json<OpenAiChatReply> {
    let response = non_streaming_text(state.upstream.as_ref(), &body.input_text, None).await;
    Json(OpenAiChatReply {
        response,
        model: state.upstream.model().to_string(),
    })
}
