use responses_stream::UpstreamError;
use thiserror::Error;

/// Errors that end a single relay operation.
///
/// Everything except [`RelayError::ConnectionClosed`] is reported to the
/// client as one `error` frame; the connection stays usable afterwards.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transport or API failure talking to the upstream
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// The upstream reported an error event mid-stream
    #[error("upstream error ({code}): {message}")]
    UpstreamReported { code: String, message: String },

    /// Inbound frame was not valid JSON or lacked a required field
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedType(String),

    /// The client went away; nothing more can be delivered
    #[error("connection closed")]
    ConnectionClosed,

    /// A relay operation panicked; carries the panic description
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Whether the error came from the upstream service rather than the client
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::UpstreamReported { .. })
    }
}
