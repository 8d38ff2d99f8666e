//! Backend contracts for upload engines and single-shot HTTP

pub mod types;

#[cfg(feature = "backend-reqwest")]
pub mod reqwest;

use crate::Result;
use crate::descriptor::UploadDescriptor;
use crate::events::{EventEmitter, UploadId};
use std::future::Future;
use std::time::Duration;
use types::{EngineCapabilities, FileInfo, HttpRequest, HttpResponse};

/// Remaining background time reported when the engine cannot extend background execution
pub const FALLBACK_REMAINING_BACKGROUND_TIME: Duration = Duration::from_secs(10 * 60 * 24);

/// Configuration for backend creation
#[derive(Clone, Debug, Default)]
pub struct BackendConfig {
    /// Request timeout
    pub timeout: Option<Duration>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Default headers to add to all requests
    pub default_headers: Option<http::HeaderMap>,
    /// Size of the slices a file is streamed in; one progress event per slice
    pub chunk_size: Option<usize>,
}

/// A background file-upload facility.
///
/// Engines own the transfer itself: queueing, keeping it alive while the app
/// is suspended, retrying. This crate only starts uploads, cancels them and
/// listens to what the engine reports through the [`EventEmitter`] handed to
/// [`UploadEngine::start_upload`]. Every event an engine emits must carry the
/// identifier `start_upload` returned, and each upload must end with exactly
/// one of `completed`, `error` or `cancelled`.
pub trait UploadEngine: Send + Sync + 'static {
    /// Start an upload and return its identifier.
    ///
    /// Fails if the descriptor is unusable (e.g. the file does not exist) or
    /// the destination cannot be reached at submission time. Failures after
    /// submission are reported as events, never through this result.
    fn start_upload(
        &self,
        descriptor: UploadDescriptor,
        events: EventEmitter,
    ) -> impl Future<Output = Result<UploadId>> + Send;

    /// Cancel an upload. Returns whether anything was cancelled; cancelling an
    /// upload that already finished is not an error.
    fn cancel_upload(&self, id: &UploadId) -> impl Future<Output = Result<bool>> + Send;

    /// Describe a file on the device. Never fails.
    fn file_info(&self, path: &str) -> impl Future<Output = FileInfo> + Send;

    /// What this engine supports
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }

    /// Let the host suspend the app again once uploads are handed off
    fn can_suspend_if_background(&self) {}

    /// Background execution time left
    fn remaining_background_time(&self) -> impl Future<Output = Duration> + Send {
        async { FALLBACK_REMAINING_BACKGROUND_TIME }
    }

    /// Ask for extra background execution time, returning a task id to end it with
    fn begin_background_task(&self) -> impl Future<Output = Option<u64>> + Send {
        async { None }
    }

    /// End a background task started with [`UploadEngine::begin_background_task`]
    fn end_background_task(&self, _task_id: u64) {}
}

/// Performs one HTTP request and reads the whole response
pub trait HttpClient: Send + Sync + 'static {
    /// Execute an HTTP request
    fn execute(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;
}
