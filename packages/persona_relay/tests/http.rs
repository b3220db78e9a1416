use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use persona_relay::persona::persona_prompt;
use persona_relay::ws::ConnectionLimits;
use persona_relay::{AppState, PacingPolicy, build_router};
use responses_stream::{NO_RESPONSE, ScriptStep, ScriptedUpstream};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(upstream: ScriptedUpstream) -> axum::Router {
    build_router(AppState::new(
        Arc::new(upstream),
        PacingPolicy::immediate(),
        ConnectionLimits::default(),
    ))
}

async fn call(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn root_reports_running() {
    let (status, body) = call(app(ScriptedUpstream::new()), "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Persona Relay API is running");
}

#[tokio::test]
async fn chat_returns_full_text_for_persona() {
    let upstream = ScriptedUpstream::new();
    upstream.push_reply("resp_1", &["Arr, ", "hello"]);
    let (status, body) = call(
        app(upstream.clone()),
        "POST",
        "/chat",
        Some(json!({"message": "hi", "persona_id": "pirate", "model": "ignored"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"response": "Arr, hello", "persona_id": "pirate"})
    );
    assert_eq!(upstream.calls()[0].input, persona_prompt("pirate", "hi"));
}

#[tokio::test]
async fn chat_defaults_persona() {
    let (_, body) = call(
        app(ScriptedUpstream::replying("x")),
        "POST",
        "/chat",
        Some(json!({"message": "hi"})),
    )
    .await;
    assert_eq!(body["persona_id"], "default");
}

#[tokio::test]
async fn upstream_failure_is_reported_in_body() {
    let upstream = ScriptedUpstream::new();
    upstream.push_script(vec![ScriptStep::Fail("connection refused".into())]);
    let (status, body) = call(
        app(upstream),
        "POST",
        "/openai-chat",
        Some(json!({"input_text": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Error: stream error: connection refused");
}

#[tokio::test]
async fn empty_output_uses_sentinel() {
    let (_, body) = call(
        app(ScriptedUpstream::new().with_model("gpt-4o")),
        "POST",
        "/openai-chat",
        Some(json!({"input_text": "hi"})),
    )
    .await;
    assert_eq!(body, json!({"response": NO_RESPONSE, "model": "gpt-4o"}));
}

#[tokio::test]
async fn multi_answers_in_order() {
    let upstream = ScriptedUpstream::new();
    upstream.push_reply("r1", &["first"]);
    upstream.push_reply("r2", &["second"]);
    let (_, body) = call(
        app(upstream),
        "POST",
        "/multi",
        Some(json!({"message": "hi", "persona_ids": ["a", "b"]})),
    )
    .await;

    assert_eq!(
        body,
        json!({"responses": [
            {"response": "first", "persona_id": "a"},
            {"response": "second", "persona_id": "b"}
        ]})
    );
}

#[tokio::test]
async fn health_and_metrics() {
    let router = app(ScriptedUpstream::new().with_model("gpt-4o"));

    let (status, body) = call(router.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["connections"], 0);

    let (_, body) = call(router.clone(), "GET", "/health/live", None).await;
    assert_eq!(body["status"], "alive");

    let (_, body) = call(router, "GET", "/metrics", None).await;
    assert_eq!(body["connections"]["total"], 0);
    assert_eq!(body["errors"]["upstream"], 0);
}

#[tokio::test]
async fn missing_required_field_is_client_error() {
    let (status, _) = call(
        app(ScriptedUpstream::new()),
        "POST",
        "/openai-chat",
        Some(json!({"text": "wrong field"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
