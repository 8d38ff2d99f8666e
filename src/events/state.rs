//! Per-upload lifecycle state

use super::EventKind;

/// Where an upload is in its lifecycle.
///
/// `Pending -> Uploading -> {Completed | Failed | Cancelled}`. Terminal states
/// accept no further events, which is how duplicate terminal events are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Started, nothing heard yet
    Pending,
    /// At least one progress event seen
    Uploading,
    /// Server responded
    Completed,
    /// Engine reported an error
    Failed,
    /// Upload was cancelled
    Cancelled,
}

impl UploadState {
    /// Whether no further events are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Failed | UploadState::Cancelled
        )
    }

    /// The state after an event of `kind`, or `None` if the event must be dropped
    pub fn on_event(self, kind: EventKind) -> Option<UploadState> {
        if self.is_terminal() {
            return None;
        }

        Some(match kind {
            EventKind::Progress => UploadState::Uploading,
            EventKind::Completed => UploadState::Completed,
            EventKind::Error => UploadState::Failed,
            EventKind::Cancelled => UploadState::Cancelled,
        })
    }
}
