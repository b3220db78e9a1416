//! Relay orchestration.
//!
//! Each inbound request is one relay operation: drive the upstream stream(s),
//! translate [`UpstreamEvent`]s into outbound frames, and deliver them through
//! the connection's [`ConnectionHandle`] in generation order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use responses_stream::{Upstream, UpstreamEvent};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::metrics::ServerMetrics;
use crate::pacing::PacingPolicy;
use crate::persona::persona_prompt;
use crate::protocol::{
    ChatRequest, ClientRequest, MultiChatRequest, OpenAiChatRequest, PersonaResult, ResponseData,
    ServerMessage, StatusPhase,
};
use crate::session::{SessionKey, SessionStore};
use crate::ws::ConnectionHandle;

/// Text and response id gathered from one upstream stream
#[derive(Debug, Default)]
struct Accumulated {
    text: String,
    response_id: String,
}

impl Accumulated {
    /// Fold one event in, returning any user-visible text it carried.
    fn absorb(&mut self, event: UpstreamEvent) -> Result<Option<String>, RelayError> {
        match event {
            UpstreamEvent::Started { id } => {
                self.response_id = id;
                Ok(None)
            }
            UpstreamEvent::TextDelta { text } if text.is_empty() => Ok(None),
            UpstreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                Ok(Some(text))
            }
            UpstreamEvent::FunctionCallFragment {
                index,
                partial_json,
            } => {
                debug!(index, len = partial_json.len(), "Function call fragment");
                Ok(None)
            }
            UpstreamEvent::Completed => Ok(None),
            UpstreamEvent::Error { code, message } => {
                Err(RelayError::UpstreamReported { code, message })
            }
        }
    }
}

pub struct Relay {
    upstream: Arc<dyn Upstream>,
    pacing: PacingPolicy,
    metrics: Arc<ServerMetrics>,
}

impl Relay {
    pub fn new(upstream: Arc<dyn Upstream>, pacing: PacingPolicy) -> Self {
        Self {
            upstream,
            pacing,
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle one inbound text frame end to end.
    ///
    /// Every failure except a closed connection becomes exactly one `error`
    /// frame, including panics inside the operation. `Err` is returned only
    /// when the connection is gone.
    pub async fn dispatch(
        &self,
        out: &ConnectionHandle,
        sessions: &mut SessionStore,
        text: &str,
    ) -> Result<(), RelayError> {
        let outcome = AssertUnwindSafe(self.route(out, sessions, text))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RelayError::Internal(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => Ok(()),
            Err(RelayError::ConnectionClosed) => {
                debug!(conn_id = %out.id(), "Connection closed during relay");
                Err(RelayError::ConnectionClosed)
            }
            Err(e) => {
                self.metrics.relay_error(e.is_upstream());
                match &e {
                    RelayError::Internal(_) => error!(conn_id = %out.id(), "Relay failed: {}", e),
                    _ => warn!(conn_id = %out.id(), "Relay failed: {}", e),
                }
                out.send(ServerMessage::error(e.to_string())).await
            }
        }
    }

    async fn route(
        &self,
        out: &ConnectionHandle,
        sessions: &mut SessionStore,
        text: &str,
    ) -> Result<(), RelayError> {
        let request = ClientRequest::parse(text)?;
        self.metrics.relay_started();
        info!(conn_id = %out.id(), kind = request.kind(), "Relay started");

        match request {
            ClientRequest::OpenAiChat(req) => self.relay_direct(out, sessions, req).await,
            ClientRequest::Chat(req) => self.relay_persona(out, sessions, req).await,
            ClientRequest::MultiChat(req) => self.relay_batch(out, sessions, req).await,
        }
    }

    /// Stream raw model output, one chunk per upstream delta.
    pub async fn relay_direct(
        &self,
        out: &ConnectionHandle,
        sessions: &mut SessionStore,
        req: OpenAiChatRequest,
    ) -> Result<(), RelayError> {
        let model = self.upstream.model().to_string();
        out.send(ServerMessage::status(
            StatusPhase::Starting,
            "Initializing OpenAI request...",
        ))
        .await?;

        let key = SessionKey::Direct;
        let continuation = sessions.resolve(&key, req.previous_response_id);

        out.send(ServerMessage::status(
            StatusPhase::Processing,
            format!("Sending request to OpenAI ({})...", model),
        ))
        .await?;
        out.send(ServerMessage::status(
            StatusPhase::Streaming,
            "Receiving response from OpenAI...",
        ))
        .await?;

        let mut stream = self
            .upstream
            .stream(&req.input_text, continuation.as_deref());
        let mut acc = Accumulated::default();
        while let Some(item) = stream.next().await {
            if let Some(text) = acc.absorb(item?)? {
                out.send(ServerMessage::chunk(text, None)).await?;
            }
        }

        remember(sessions, &key, &acc.response_id);
        out.send(ServerMessage::final_chunk(None)).await?;
        out.send(ServerMessage::response(ResponseData::Direct {
            response: acc.text,
            model,
            response_id: acc.response_id,
        }))
        .await
    }

    /// Stream one persona's answer, re-chunked and paced.
    pub async fn relay_persona(
        &self,
        out: &ConnectionHandle,
        sessions: &mut SessionStore,
        req: ChatRequest,
    ) -> Result<(), RelayError> {
        let persona_id = req.persona_id;
        out.send(ServerMessage::status(
            StatusPhase::Starting,
            "Preparing persona response...",
        ))
        .await?;

        let key = SessionKey::persona(&persona_id);
        let continuation = sessions.resolve(&key, req.previous_response_id);
        let prompt = persona_prompt(&persona_id, &req.message);

        out.send(ServerMessage::status(
            StatusPhase::Processing,
            format!("Getting response from {}...", persona_id),
        ))
        .await?;

        let mut stream = self.upstream.stream(&prompt, continuation.as_deref());
        let mut acc = Accumulated::default();
        while let Some(item) = stream.next().await {
            let Some(text) = acc.absorb(item?)? else {
                continue;
            };
            for unit in self.pacing.split(&text) {
                out.send(ServerMessage::chunk(unit, Some(&persona_id))).await?;
                self.pacing.pause().await;
            }
        }

        remember(sessions, &key, &acc.response_id);
        out.send(ServerMessage::final_chunk(Some(&persona_id))).await?;
        out.send(ServerMessage::response(ResponseData::Persona {
            response: acc.text,
            persona_id,
            response_id: acc.response_id,
        }))
        .await
    }

    /// Ask each persona in turn; one persona failing does not stop the rest.
    pub async fn relay_batch(
        &self,
        out: &ConnectionHandle,
        sessions: &mut SessionStore,
        req: MultiChatRequest,
    ) -> Result<(), RelayError> {
        out.send(ServerMessage::status(
            StatusPhase::Starting,
            "Preparing multi-persona responses...",
        ))
        .await?;

        let total = req.persona_ids.len();
        let mut responses = Vec::with_capacity(total);

        for (index, persona_id) in req.persona_ids.into_iter().enumerate() {
            out.send(ServerMessage::status(
                StatusPhase::Processing,
                format!(
                    "Getting response from {} ({}/{})...",
                    persona_id,
                    index + 1,
                    total
                ),
            ))
            .await?;

            let key = SessionKey::persona(&persona_id);
            let continuation = sessions.resolve(&key, None);
            let prompt = persona_prompt(&persona_id, &req.message);

            let mut acc = Accumulated::default();
            match self.collect(&prompt, continuation.as_deref(), &mut acc).await {
                Ok(()) => remember(sessions, &key, &acc.response_id),
                Err(e) => {
                    self.metrics.relay_error(e.is_upstream());
                    warn!(persona_id = %persona_id, "Persona failed in batch: {}", e);
                    out.send(ServerMessage::error(format!("{}: {}", persona_id, e)))
                        .await?;
                }
            }

            out.send(ServerMessage::PersonaResponse {
                persona_id: persona_id.clone(),
                response: acc.text.clone(),
                response_id: acc.response_id.clone(),
                index,
            })
            .await?;

            responses.push(PersonaResult {
                persona_id,
                response: acc.text,
                response_id: acc.response_id,
            });
        }

        out.send(ServerMessage::response(ResponseData::Batch { responses }))
            .await
    }

    /// Run a stream to its end without emitting chunks
    async fn collect(
        &self,
        input: &str,
        continuation: Option<&str>,
        acc: &mut Accumulated,
    ) -> Result<(), RelayError> {
        let mut stream = self.upstream.stream(input, continuation);
        while let Some(item) = stream.next().await {
            acc.absorb(item?)?;
        }
        Ok(())
    }
}

fn remember(sessions: &mut SessionStore, key: &SessionKey, response_id: &str) {
    if !response_id.is_empty() {
        sessions.update_token(key, response_id);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "relay task panicked".to_string()
    }
}
