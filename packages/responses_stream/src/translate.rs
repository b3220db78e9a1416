//! Vendor event translation.
//!
//! This is the single place that knows the Responses API event tags. Everything
//! downstream works with [`UpstreamEvent`].

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::event::{FunctionCall, UpstreamEvent};

/// Vendor events the translator acts on. Anything else lands in `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum VendorEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseRef },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: usize,
        item: OutputItem,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { output_index: usize, delta: String },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: String,
}

/// Stateful translator for one upstream stream.
///
/// Function-call output items are buffered by output index so their argument
/// deltas can be reassembled; they are never surfaced as text.
#[derive(Debug, Default)]
pub struct EventTranslator {
    function_calls: BTreeMap<usize, FunctionCall>,
    finished: bool,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one SSE `data` payload.
    ///
    /// Returns `None` for events that carry nothing for the caller, and for
    /// everything after a terminal event.
    pub fn translate(&mut self, payload: &str) -> Option<UpstreamEvent> {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => self.translate_value(value),
            Err(e) => {
                warn!("Skipping undecodable upstream event: {}", e);
                None
            }
        }
    }

    pub fn translate_value(&mut self, value: serde_json::Value) -> Option<UpstreamEvent> {
        if self.finished {
            return None;
        }

        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("<untyped>")
            .to_string();

        let event = match serde_json::from_value::<VendorEvent>(value) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_type = %event_type, "Malformed upstream event ignored: {}", e);
                return None;
            }
        };

        match event {
            VendorEvent::Created { response } => {
                debug!(response_id = %response.id, "Upstream response created");
                Some(UpstreamEvent::Started { id: response.id })
            }
            VendorEvent::OutputItemAdded { output_index, item } => {
                if item.kind == "function_call" {
                    self.function_calls.insert(
                        output_index,
                        FunctionCall {
                            call_id: item.call_id,
                            name: item.name,
                            arguments: item.arguments,
                        },
                    );
                } else {
                    debug!(output_index, kind = %item.kind, "Ignoring non-function output item");
                }
                None
            }
            VendorEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
            } => match self.function_calls.get_mut(&output_index) {
                Some(call) => {
                    call.arguments.push_str(&delta);
                    Some(UpstreamEvent::FunctionCallFragment {
                        index: output_index,
                        partial_json: delta,
                    })
                }
                None => {
                    debug!(output_index, "Arguments delta for unknown output item");
                    None
                }
            },
            VendorEvent::OutputTextDelta { delta } => {
                Some(UpstreamEvent::TextDelta { text: delta })
            }
            VendorEvent::Completed => {
                self.finished = true;
                Some(UpstreamEvent::Completed)
            }
            VendorEvent::Error { code, message } => {
                self.finished = true;
                Some(UpstreamEvent::Error {
                    code: code.unwrap_or_else(|| "unknown".to_string()),
                    message: message.unwrap_or_else(|| "Unknown error".to_string()),
                })
            }
            VendorEvent::Other => {
                debug!(event_type = %event_type, "Ignoring upstream event");
                None
            }
        }
    }

    /// Whether a terminal event has been translated
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Function calls seen so far, keyed by output index
    pub fn function_calls(&self) -> &BTreeMap<usize, FunctionCall> {
        &self.function_calls
    }
}
