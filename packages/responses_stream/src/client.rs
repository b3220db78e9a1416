//! reqwest-backed client for the Responses API

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, UpstreamError};
use crate::event::Completion;
use crate::sse::SseDecoder;
use crate::translate::EventTranslator;
use crate::upstream::{EventStream, Upstream};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Responses API client
#[derive(Debug, Clone)]
pub struct ResponsesClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ResponsesClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at an API-compatible service (or a test server)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bound every request, including the full streaming body, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    fn request_body(
        &self,
        input: &str,
        continuation: Option<&str>,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": input,
            "stream": stream,
        });
        if let Some(token) = continuation {
            body["previous_response_id"] = serde_json::Value::String(token.to_string());
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(UpstreamError::Api {
            status: status.as_u16(),
            message: api_error_message(&text),
        })
    }
}

/// Pull `error.message` out of a vendor error body, falling back to the raw text
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    id: String,
    #[serde(default)]
    output: Vec<OutputEntry>,
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponseObject {
    fn into_completion(self) -> Completion {
        let text = if self.output.is_empty() {
            None
        } else {
            Some(
                self.output
                    .iter()
                    .filter(|entry| entry.kind == "message")
                    .flat_map(|entry| entry.content.iter())
                    .filter(|part| part.kind == "output_text")
                    .map(|part| part.text.as_str())
                    .collect(),
            )
        };
        Completion { id: self.id, text }
    }
}

#[async_trait]
impl Upstream for ResponsesClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn stream(&self, input: &str, continuation: Option<&str>) -> EventStream {
        let this = self.clone();
        let body = self.request_body(input, continuation, true);

        Box::pin(async_stream::stream! {
            let response = match this.send(&body).await {
                Ok(resp) => resp,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut translator = EventTranslator::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(UpstreamError::Http(e));
                        return;
                    }
                };

                for payload in decoder.push(&chunk) {
                    if let Some(event) = translator.translate(&payload) {
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                }
            }

            if let Some(payload) = decoder.finish() {
                if let Some(event) = translator.translate(&payload) {
                    yield Ok(event);
                }
            }

            if !translator.is_finished() {
                warn!("Upstream body ended without a completion event");
            }
        })
    }

    async fn complete(&self, input: &str, continuation: Option<&str>) -> Result<Completion> {
        let body = self.request_body(input, continuation, false);
        let response: ResponseObject = self.send(&body).await?.json().await?;
        debug!(
            response_id = %response.id,
            items = response.output.len(),
            "Upstream completion received"
        );
        Ok(response.into_completion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UpstreamEvent;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(events: &[&str]) -> String {
        events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect()
    }

    async fn collect(stream: EventStream) -> Vec<UpstreamEvent> {
        stream.map(|r| r.expect("stream item")).collect().await
    }

    #[tokio::test]
    async fn streams_translated_events_and_stops_at_completed() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"type":"response.created","response":{"id":"resp_42"}}"#,
            r#"{"type":"response.in_progress","response":{"id":"resp_42"}}"#,
            r#"{"type":"response.output_text.delta","delta":"Hel"}"#,
            r#"{"type":"response.output_text.delta","delta":"lo"}"#,
            r#"{"type":"response.completed","response":{"id":"resp_42"}}"#,
            r#"{"type":"response.output_text.delta","delta":"never"}"#,
        ]);
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(
                serde_json::json!({"stream": true, "input": "hi", "model": "gpt-4o"}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = ResponsesClient::new("sk-test").with_base_url(server.uri());
        let events = collect(client.stream("hi", None)).await;
        assert_eq!(
            events,
            vec![
                UpstreamEvent::started("resp_42"),
                UpstreamEvent::text("Hel"),
                UpstreamEvent::text("lo"),
                UpstreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn continuation_token_is_sent_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_partial_json(
                serde_json::json!({"previous_response_id": "resp_prev/+=="}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[r#"{"type":"response.completed","response":{"id":"r"}}"#]),
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let events = collect(client.stream("again", Some("resp_prev/+=="))).await;
        assert_eq!(events, vec![UpstreamEvent::Completed]);
    }

    #[tokio::test]
    async fn vendor_error_event_ends_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[
                    r#"{"type":"response.output_text.delta","delta":"par"}"#,
                    r#"{"type":"error","code":"server_error","message":"boom"}"#,
                    r#"{"type":"response.output_text.delta","delta":"tial"}"#,
                ]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let events = collect(client.stream("x", None)).await;
        assert_eq!(
            events,
            vec![
                UpstreamEvent::text("par"),
                UpstreamEvent::error("server_error", "boom"),
            ]
        );
    }

    #[tokio::test]
    async fn http_error_status_is_yielded_as_err() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let client = ResponsesClient::new("bad").with_base_url(server.uri());
        let mut stream = client.stream("x", None);
        match stream.next().await {
            Some(Err(UpstreamError::Api { status, message })) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unterminated_final_frame_is_flushed() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\n\ndata: {}",
            r#"{"type":"response.output_text.delta","delta":"a"}"#,
            r#"{"type":"response.completed"}"#
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let events = collect(client.stream("x", None)).await;
        assert_eq!(
            events,
            vec![UpstreamEvent::text("a"), UpstreamEvent::Completed]
        );
    }

    #[tokio::test]
    async fn complete_concatenates_output_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_7",
                "output": [
                    {"type": "reasoning", "summary": []},
                    {"type": "message", "role": "assistant", "content": [
                        {"type": "output_text", "text": "Arr, ", "annotations": []},
                        {"type": "output_text", "text": "matey!", "annotations": []}
                    ]}
                ]
            })))
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let completion = client.complete("hi", None).await.unwrap();
        assert_eq!(completion.id, "resp_7");
        assert_eq!(completion.text.as_deref(), Some("Arr, matey!"));
    }

    #[tokio::test]
    async fn complete_without_output_has_no_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "resp_empty", "output": []})),
            )
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let completion = client.complete("hi", None).await.unwrap();
        assert!(completion.text.is_none());
        assert_eq!(
            crate::non_streaming_text(&client, "hi", None).await,
            crate::NO_RESPONSE
        );
    }

    #[tokio::test]
    async fn non_streaming_text_reports_errors_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = ResponsesClient::new("k").with_base_url(server.uri());
        let text = crate::non_streaming_text(&client, "hi", None).await;
        assert_eq!(text, "Error: upstream returned 500: overloaded");
    }

    #[test]
    fn api_error_message_fallbacks() {
        assert_eq!(api_error_message(""), "empty response body");
        assert_eq!(api_error_message(" nope "), "nope");
        assert_eq!(
            api_error_message(r#"{"error":{"message":"quota"}}"#),
            "quota"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = ResponsesClient::new("k").with_base_url("http://localhost:1/v1/");
        assert_eq!(client.endpoint(), "http://localhost:1/v1/responses");
    }

    #[test]
    fn request_body_omits_missing_continuation() {
        let client = ResponsesClient::new("k").with_model("gpt-4o-mini");
        let body = client.request_body("hello", None, true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["input"], "hello");
        assert_eq!(body["stream"], true);
        assert!(body.get("previous_response_id").is_none());
    }
}
