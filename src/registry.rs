//! Upload handle registry: the promise/event surface over an upload engine

use crate::backend::types::{EngineCapabilities, FileInfo};
use crate::backend::{FALLBACK_REMAINING_BACKGROUND_TIME, UploadEngine};
use crate::descriptor::UploadDescriptor;
use crate::events::{EventKind, EventRouter, Subscription, UploadEvent, UploadId, UploadState};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Starts, cancels and observes uploads on one engine.
///
/// All uploads started through a registry report into the same routing
/// table, so a handler scoped to an identifier only ever sees that upload's
/// events. Cloning a registry shares the engine and the table.
///
/// # Examples
///
/// ```rust,no_run
/// use graphql_bg_upload::{EventKind, ReqwestBackend, UploadDescriptor, UploadRegistry};
///
/// # #[tokio::main]
/// # async fn main() -> graphql_bg_upload::Result<()> {
/// let registry = UploadRegistry::new(ReqwestBackend::new()?);
/// let descriptor = UploadDescriptor::builder("https://example.com/upload", "/tmp/video.mp4").build()?;
///
/// let id = registry.start_upload(descriptor).await?;
/// let _progress = registry.subscribe(EventKind::Progress, Some(&id), |event| {
///     println!("{:?}", event);
/// });
/// # Ok(())
/// # }
/// ```
pub struct UploadRegistry<E> {
    engine: Arc<E>,
    router: Arc<EventRouter>,
}

impl<E> Clone for UploadRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            router: self.router.clone(),
        }
    }
}

impl<E: UploadEngine> UploadRegistry<E> {
    /// Create a registry over `engine`
    pub fn new(engine: E) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    /// Create a registry over an engine that is shared with other code
    pub fn from_shared(engine: Arc<E>) -> Self {
        Self {
            engine,
            router: EventRouter::new(),
        }
    }

    /// The underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Start an upload and return the identifier the engine assigned.
    ///
    /// It is safe to subscribe after this returns: events the engine emitted
    /// in the meantime are held back and replayed to the first subscriber.
    ///
    /// A custom identifier may be reused once the upload that had it ended.
    pub async fn start_upload(&self, descriptor: UploadDescriptor) -> Result<UploadId> {
        descriptor.validate()?;

        // Routing must accept the new upload's events before the engine can emit them
        let revived = descriptor.custom_upload_id().and_then(|custom| {
            let id = UploadId::new(custom);
            self.router.revive(&id).map(|previous| (id, previous))
        });

        let id = match self
            .engine
            .start_upload(descriptor, self.router.emitter())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                if let Some((id, previous)) = revived {
                    self.router.restore(&id, previous);
                }
                return Err(e);
            }
        };
        self.router.track(&id);
        tracing::debug!("Upload {} started", id);
        Ok(id)
    }

    /// Cancel an upload. Cancelling an upload that already finished returns
    /// the engine's answer (usually `false`) rather than an error.
    pub async fn cancel_upload(&self, id: impl AsRef<str>) -> Result<bool> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(Error::InvalidArgument(
                "Upload ID must be a non-empty string".to_string(),
            ));
        }

        let cancelled = self.engine.cancel_upload(&UploadId::new(id)).await?;
        tracing::debug!("Cancel upload {}: {}", id, cancelled);
        Ok(cancelled)
    }

    /// Listen for `kind` events, either for one upload or, with `None`, for all of them
    pub fn subscribe<F>(&self, kind: EventKind, id: Option<&UploadId>, handler: F) -> Subscription
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(&[kind], id, Arc::new(handler))
    }

    /// Listen for several event kinds with one handler
    pub fn subscribe_kinds<F>(
        &self,
        kinds: &[EventKind],
        id: Option<&UploadId>,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(kinds, id, Arc::new(handler))
    }

    /// Lifecycle state of an upload started through this registry
    pub fn state(&self, id: &UploadId) -> Option<UploadState> {
        self.router.state(id)
    }

    /// Number of live subscriptions for an upload, or the unscoped ones for `None`
    pub fn subscriber_count(&self, id: Option<&UploadId>) -> usize {
        self.router.subscriber_count(id)
    }

    /// Stop holding events for an upload nobody will observe. A running
    /// upload is forgotten as soon as it ends.
    pub fn discard(&self, id: &UploadId) {
        self.router.discard(id);
    }

    /// Number of uploads the routing table still holds
    pub fn tracked_uploads(&self) -> usize {
        self.router.route_count()
    }

    /// Describe a file on the device. Never fails.
    pub async fn file_info(&self, path: &str) -> FileInfo {
        self.engine.file_info(path).await
    }

    /// What the engine supports
    pub fn capabilities(&self) -> EngineCapabilities {
        self.engine.capabilities()
    }

    /// Tell the host the app may be suspended again
    pub fn can_suspend_if_background(&self) {
        if self.capabilities().supports_background_extension {
            self.engine.can_suspend_if_background();
        } else {
            tracing::debug!("can_suspend_if_background: no background extension support");
        }
    }

    /// Background execution time left, or a large fixed value when the
    /// engine cannot extend background execution
    pub async fn remaining_background_time(&self) -> Duration {
        if self.capabilities().supports_background_extension {
            self.engine.remaining_background_time().await
        } else {
            FALLBACK_REMAINING_BACKGROUND_TIME
        }
    }

    /// Request extra background time. `None` when unsupported.
    ///
    /// Do not call again before ending the previous task with
    /// [`UploadRegistry::end_background_task`].
    pub async fn begin_background_task(&self) -> Option<u64> {
        if self.capabilities().supports_background_extension {
            self.engine.begin_background_task().await
        } else {
            None
        }
    }

    /// End a background task started with [`UploadRegistry::begin_background_task`]
    pub fn end_background_task(&self, task_id: u64) {
        if self.capabilities().supports_background_extension {
            self.engine.end_background_task(task_id);
        }
    }
}
