//! Streaming access to the OpenAI Responses API.
//!
//! The vendor's server-sent events are decoded ([`sse`]) and translated
//! ([`translate`]) into [`UpstreamEvent`], a small closed union that is the
//! only thing consumers ever match on. [`Upstream`] is the seam consumers
//! depend on; [`ResponsesClient`] is the real implementation and
//! `ScriptedUpstream` (behind the `test-utils` feature) a deterministic one.

pub mod client;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
pub mod sse;
pub mod translate;
pub mod upstream;

pub use client::{DEFAULT_BASE_URL, DEFAULT_MODEL, ResponsesClient};
pub use error::{Result, UpstreamError};
pub use event::{Completion, FunctionCall, UpstreamEvent};
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{RecordedCall, ScriptStep, ScriptedUpstream};
pub use upstream::{EventStream, NO_RESPONSE, Upstream, non_streaming_text};
