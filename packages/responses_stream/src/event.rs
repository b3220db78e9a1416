//! The internal event union every upstream stream is normalized into.

/// One event from an upstream response stream.
///
/// This is the only vocabulary the relay sees; vendor event tags never leave
/// the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// The upstream accepted the request and issued a response id.
    /// Metadata only, never user-visible text.
    Started { id: String },
    /// A fragment of generated text.
    TextDelta { text: String },
    /// A fragment of function-call arguments for the output item at `index`.
    FunctionCallFragment { index: usize, partial_json: String },
    /// Normal end of the stream.
    Completed,
    /// The upstream reported an error; the stream ends after this.
    Error { code: String, message: String },
}

impl UpstreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn started(id: impl Into<String>) -> Self {
        Self::Started { id: id.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the stream ends after this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error { .. })
    }
}

/// A function call assembled from `output_item.added` plus its argument deltas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionCall {
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Result of a single non-streaming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Continuation token for the resulting conversation state
    pub id: String,
    /// Concatenated output text, `None` when the response had no output items
    pub text: Option<String>,
}
