//! Driving one upload from start to a single parsed result

use crate::backend::UploadEngine;
use crate::descriptor::UploadDescriptor;
use crate::events::{EventKind, Subscription, UploadEvent, UploadId};
use crate::registry::UploadRegistry;
use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callback for upload events
pub type UploadCallback = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

/// Optional hooks invoked while an upload runs.
///
/// `on_error` fires for failures and cancellations alike; `on_cancelled`
/// fires in addition for cancellations.
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    on_error: Option<UploadCallback>,
    on_cancelled: Option<UploadCallback>,
    on_progress: Option<UploadCallback>,
    on_completed: Option<UploadCallback>,
}

impl UploadCallbacks {
    /// No callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the `error` or `cancelled` event that ended an upload
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Called with the `cancelled` event when an upload is cancelled
    pub fn on_cancelled<F>(mut self, callback: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.on_cancelled = Some(Arc::new(callback));
        self
    }

    /// Called for every `progress` event
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Called with the `completed` event once its body has parsed
    pub fn on_completed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.on_completed = Some(Arc::new(callback));
        self
    }

    fn call(callback: &Option<UploadCallback>, event: &UploadEvent) {
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

impl fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .finish()
    }
}

/// A started upload and the subscriptions that observe it.
///
/// The subscriptions belong to the task and are released as soon as a
/// terminal event arrives, or when the task is dropped.
pub struct UploadTask {
    id: UploadId,
    receiver: mpsc::UnboundedReceiver<UploadEvent>,
    subscriptions: Vec<Subscription>,
    callbacks: UploadCallbacks,
}

impl UploadTask {
    /// Start `descriptor` and subscribe to all four event kinds for it
    pub async fn start<E: UploadEngine>(
        registry: &UploadRegistry<E>,
        descriptor: UploadDescriptor,
        callbacks: UploadCallbacks,
    ) -> Result<Self> {
        let id = registry.start_upload(descriptor).await?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let subscriptions = EventKind::ALL
            .iter()
            .map(|&kind| {
                let sender = sender.clone();
                registry.subscribe(kind, Some(&id), move |event| {
                    // The receiver is gone once the task finished or was dropped
                    let _ = sender.send(event.clone());
                })
            })
            .collect();

        Ok(Self {
            id,
            receiver,
            subscriptions,
            callbacks,
        })
    }

    /// Identifier the engine assigned to this upload
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    /// Wait for the upload to end and return its parsed response body.
    ///
    /// There is no timeout: a stalled upload stalls this future.
    pub async fn finish<E: UploadEngine>(mut self, registry: &UploadRegistry<E>) -> Result<Value> {
        loop {
            let Some(event) = self.receiver.recv().await else {
                return Err(Error::Internal(format!(
                    "Event stream for upload {} closed before a terminal event",
                    self.id
                )));
            };

            match &event {
                UploadEvent::Progress { .. } => {
                    UploadCallbacks::call(&self.callbacks.on_progress, &event);
                }
                UploadEvent::Error { error, .. } | UploadEvent::Cancelled { error, .. } => {
                    self.release();
                    let cancelled = event.kind() == EventKind::Cancelled;

                    if let Err(e) = registry.cancel_upload(&self.id).await {
                        tracing::warn!("Best-effort cancel of upload {} failed: {}", self.id, e);
                    }

                    UploadCallbacks::call(&self.callbacks.on_error, &event);
                    if cancelled {
                        UploadCallbacks::call(&self.callbacks.on_cancelled, &event);
                    }

                    return Err(Error::UploadFailed {
                        id: self.id.to_string(),
                        message: error.clone(),
                        cancelled,
                    });
                }
                UploadEvent::Completed {
                    response_code,
                    response_body,
                    ..
                } => {
                    self.release();
                    tracing::debug!(
                        "Upload {} completed with status {}",
                        self.id,
                        response_code
                    );

                    let value = serde_json::from_str(response_body).map_err(|source| {
                        tracing::error!("Upload {} returned a non-JSON body: {}", self.id, source);
                        Error::MalformedResponse {
                            body: response_body.clone(),
                            source,
                        }
                    })?;

                    UploadCallbacks::call(&self.callbacks.on_completed, &event);
                    return Ok(value);
                }
            }
        }
    }

    fn release(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.remove();
        }
    }
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("id", &self.id)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Start one upload and wait for its parsed response
pub async fn run_upload<E: UploadEngine>(
    registry: &UploadRegistry<E>,
    descriptor: UploadDescriptor,
    callbacks: UploadCallbacks,
) -> Result<Value> {
    UploadTask::start(registry, descriptor, callbacks)
        .await?
        .finish(registry)
        .await
}
