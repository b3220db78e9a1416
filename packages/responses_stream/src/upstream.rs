//! The upstream capability the relay depends on.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use crate::error::Result;
use crate::event::{Completion, UpstreamEvent};

/// Lazy, forward-only sequence of events for one upstream call.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent>> + Send>>;

/// Text returned by the non-streaming path when the upstream produced no output.
pub const NO_RESPONSE: &str = "No response generated";

/// A completion service that can continue a conversation from an opaque token.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Model name requests are issued against
    fn model(&self) -> &str;

    /// Start a streaming call. Each invocation is an independent request;
    /// dropping the stream releases the underlying connection.
    fn stream(&self, input: &str, continuation: Option<&str>) -> EventStream;

    /// Issue a single blocking call and return the complete result.
    async fn complete(&self, input: &str, continuation: Option<&str>) -> Result<Completion>;
}

/// Non-streaming exchange that never fails: the generated text, the
/// [`NO_RESPONSE`] sentinel, or an `"Error: ..."` description.
pub async fn non_streaming_text(
    upstream: &dyn Upstream,
    input: &str,
    continuation: Option<&str>,
) -> String {
    match upstream.complete(input, continuation).await {
        Ok(Completion {
            text: Some(text), ..
        }) => text,
        Ok(_) => NO_RESPONSE.to_string(),
        Err(e) => {
            warn!("Non-streaming upstream call failed: {}", e);
            format!("Error: {}", e)
        }
    }
}
