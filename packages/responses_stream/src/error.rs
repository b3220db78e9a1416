use thiserror::Error;

/// Errors that can occur while talking to the upstream completion service
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Connection, TLS, or body transfer failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event stream broke off in a way the transport did not report
    #[error("stream error: {0}")]
    Stream(String),
}

/// Result type alias for upstream operations
pub type Result<T> = std::result::Result<T, UpstreamError>;
