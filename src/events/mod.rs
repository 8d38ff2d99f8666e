//! Upload lifecycle events and their routing

pub mod router;
pub mod state;

pub use router::{EventEmitter, EventHandler, EventRouter, PARKED_CAPACITY, Subscription};
pub use state::UploadState;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one upload, assigned by the engine at start time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Wrap an identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UploadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for UploadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The four kinds of event an engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Bytes were sent
    Progress,
    /// The upload failed
    Error,
    /// The upload was cancelled
    Cancelled,
    /// The server answered
    Completed,
}

impl EventKind {
    /// All kinds, in the order progress is guaranteed to precede the rest
    pub const ALL: [EventKind; 4] = [
        EventKind::Progress,
        EventKind::Error,
        EventKind::Cancelled,
        EventKind::Completed,
    ];

    /// Event name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Progress => "progress",
            EventKind::Error => "error",
            EventKind::Cancelled => "cancelled",
            EventKind::Completed => "completed",
        }
    }

    /// Whether this kind ends an upload
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventKind::Progress)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by an upload engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum UploadEvent {
    /// Upload progress, 0 to 100
    Progress {
        /// Upload identifier
        id: UploadId,
        /// Percentage sent
        progress: f64,
    },
    /// The engine gave up on the upload
    Error {
        /// Upload identifier
        id: UploadId,
        /// Error message
        error: String,
    },
    /// The upload was cancelled
    Cancelled {
        /// Upload identifier
        id: UploadId,
        /// Cancellation reason
        error: String,
    },
    /// The server responded
    #[serde(rename_all = "camelCase")]
    Completed {
        /// Upload identifier
        id: UploadId,
        /// HTTP status code
        response_code: u16,
        /// Response body as text
        response_body: String,
    },
}

impl UploadEvent {
    /// Identifier of the upload this event belongs to
    pub fn id(&self) -> &UploadId {
        match self {
            UploadEvent::Progress { id, .. }
            | UploadEvent::Error { id, .. }
            | UploadEvent::Cancelled { id, .. }
            | UploadEvent::Completed { id, .. } => id,
        }
    }

    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            UploadEvent::Progress { .. } => EventKind::Progress,
            UploadEvent::Error { .. } => EventKind::Error,
            UploadEvent::Cancelled { .. } => EventKind::Cancelled,
            UploadEvent::Completed { .. } => EventKind::Completed,
        }
    }
}
