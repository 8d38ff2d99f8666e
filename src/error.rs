//! Error types for uploads and the GraphQL transport link

use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the upload registry, orchestrator and transport link
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was malformed (e.g. an empty upload identifier)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An upload descriptor failed validation or names a file that does not exist
    #[error("Invalid upload descriptor: {0}")]
    InvalidDescriptor(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The destination could not be reached when the request was submitted
    #[error("Connection error: {message}")]
    Connection {
        /// Error message
        message: String,
    },

    /// The plain JSON request completed with a non-success status
    #[error("HTTP error {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body as text
        body: String,
    },

    /// A completed upload returned a body that is not valid JSON
    #[error("Malformed response body: {source}")]
    MalformedResponse {
        /// The raw body that failed to parse
        body: String,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// The upload engine reported an error or cancellation for a file upload
    #[error("Upload {id} failed: {message}")]
    UploadFailed {
        /// Identifier of the failed upload
        id: String,
        /// Error message carried by the engine event
        message: String,
        /// Whether the failure was a cancellation
        cancelled: bool,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents a cancelled upload
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::UploadFailed {
                cancelled: true,
                ..
            }
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::InvalidUrl(error.to_string())
    }
}
