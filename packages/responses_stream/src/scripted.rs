//! Deterministic upstream for tests.
//!
//! A `ScriptedUpstream` plays back queued scripts one call at a time and
//! records every call it receives. When the queue is empty it falls back to a
//! default reply so tests only script the calls they care about.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, UpstreamError};
use crate::event::{Completion, UpstreamEvent};
use crate::upstream::{EventStream, Upstream};

/// One step of a scripted upstream call
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(UpstreamEvent),
    /// Yield a transport failure and end the stream
    Fail(String),
    /// Sleep before the next step
    Stall(Duration),
}

/// What the upstream was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub input: String,
    pub continuation: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: VecDeque<Vec<ScriptStep>>,
    default_reply: Option<String>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug, Clone)]
pub struct ScriptedUpstream {
    inner: Arc<Mutex<Inner>>,
    next_id: Arc<AtomicU64>,
    model: String,
}

impl Default for ScriptedUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            model: "scripted".to_string(),
        }
    }

    /// Upstream whose every unscripted call streams `text` as one delta
    pub fn replying(text: impl Into<String>) -> Self {
        let upstream = Self::new();
        upstream.lock().default_reply = Some(text.into());
        upstream
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue a script for the next unanswered call
    pub fn push_script(&self, steps: Vec<ScriptStep>) -> &Self {
        self.lock().scripts.push_back(steps);
        self
    }

    /// Queue a normal reply: `Started`, one delta per fragment, `Completed`
    pub fn push_reply(&self, id: &str, fragments: &[&str]) -> &Self {
        let mut steps = vec![ScriptStep::Event(UpstreamEvent::started(id))];
        steps.extend(
            fragments
                .iter()
                .map(|f| ScriptStep::Event(UpstreamEvent::text(*f))),
        );
        steps.push(ScriptStep::Event(UpstreamEvent::Completed));
        self.push_script(steps)
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_script(&self, input: &str, continuation: Option<&str>) -> Vec<ScriptStep> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            input: input.to_string(),
            continuation: continuation.map(str::to_string),
        });
        if let Some(script) = inner.scripts.pop_front() {
            return script;
        }

        let id = format!("resp_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut steps = vec![ScriptStep::Event(UpstreamEvent::started(id))];
        if let Some(text) = inner.default_reply.clone() {
            steps.push(ScriptStep::Event(UpstreamEvent::text(text)));
        }
        steps.push(ScriptStep::Event(UpstreamEvent::Completed));
        steps
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    fn model(&self) -> &str {
        &self.model
    }

    fn stream(&self, input: &str, continuation: Option<&str>) -> EventStream {
        let steps = self.next_script(input, continuation);
        Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    ScriptStep::Event(event) => yield Ok(event),
                    ScriptStep::Fail(message) => {
                        yield Err(UpstreamError::Stream(message));
                        return;
                    }
                    ScriptStep::Stall(duration) => tokio::time::sleep(duration).await,
                }
            }
        })
    }

    async fn complete(&self, input: &str, continuation: Option<&str>) -> Result<Completion> {
        let steps = self.next_script(input, continuation);
        let mut id = String::new();
        let mut text: Option<String> = None;

        for step in steps {
            match step {
                ScriptStep::Event(UpstreamEvent::Started { id: started }) => id = started,
                ScriptStep::Event(UpstreamEvent::TextDelta { text: delta }) => {
                    text.get_or_insert_with(String::new).push_str(&delta);
                }
                ScriptStep::Event(UpstreamEvent::Error { code, message }) => {
                    return Err(UpstreamError::Api {
                        status: 500,
                        message: format!("{}: {}", code, message),
                    });
                }
                ScriptStep::Event(_) => {}
                ScriptStep::Fail(message) => return Err(UpstreamError::Stream(message)),
                ScriptStep::Stall(duration) => tokio::time::sleep(duration).await,
            }
        }

        Ok(Completion { id, text })
    }
}
