//! Background upload tasks for the reqwest backend

use crate::backend::types::{guess_mime_type, resolve_file_path};
use crate::descriptor::{UploadDescriptor, UploadType};
use crate::events::{EventEmitter, UploadId};
use crate::{Error, Result};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use url::Url;

static NEXT_UPLOAD: AtomicU64 = AtomicU64::new(1);

/// Generate a unique upload identifier
fn generate_upload_id() -> UploadId {
    UploadId::new(format!(
        "upload-{}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        NEXT_UPLOAD.fetch_add(1, Ordering::Relaxed)
    ))
}

struct ActiveUpload {
    handle: JoinHandle<()>,
    events: EventEmitter,
}

/// Uploads that have been started and have not reported a terminal event yet.
///
/// Whoever removes an entry owns the terminal event for it: the task itself
/// when the transfer ends, or [`ActiveUploads::cancel`].
#[derive(Clone, Default)]
pub(super) struct ActiveUploads {
    inner: Arc<Mutex<HashMap<UploadId, ActiveUpload>>>,
}

impl ActiveUploads {
    fn lock(&self) -> MutexGuard<'_, HashMap<UploadId, ActiveUpload>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn len(&self) -> usize {
        self.lock().len()
    }

    fn take(&self, id: &UploadId) -> Option<ActiveUpload> {
        self.lock().remove(id)
    }

    /// Abort a running upload and report it as cancelled
    pub(super) fn cancel(&self, id: &UploadId) -> bool {
        match self.take(id) {
            Some(upload) => {
                upload.handle.abort();
                tracing::debug!("Upload {} cancelled", id);
                upload.events.cancelled(id, "Upload cancelled");
                true
            }
            None => {
                tracing::debug!("Cancel requested for inactive upload {}", id);
                false
            }
        }
    }
}

/// Validate the descriptor, then hand the transfer to a detached task
pub(super) async fn start_upload(
    client: &reqwest::Client,
    uploads: &ActiveUploads,
    chunk_size: usize,
    descriptor: UploadDescriptor,
    events: EventEmitter,
) -> Result<UploadId> {
    descriptor.validate()?;
    let url = Url::parse(descriptor.url())?;
    let file_path = resolve_file_path(descriptor.path())?;

    let metadata = tokio::fs::metadata(&file_path).await.map_err(|e| {
        Error::InvalidDescriptor(format!("Cannot read {}: {}", file_path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(Error::InvalidDescriptor(format!(
            "{} is not a file",
            file_path.display()
        )));
    }

    let mut active = uploads.lock();

    let id = match descriptor.custom_upload_id() {
        Some(custom) if custom.is_empty() => {
            return Err(Error::InvalidArgument(
                "Custom upload ID must not be empty".to_string(),
            ));
        }
        Some(custom) => {
            let id = UploadId::new(custom);
            if active.contains_key(&id) {
                return Err(Error::InvalidArgument(format!(
                    "Upload ID {} is already in use",
                    id
                )));
            }
            id
        }
        None => generate_upload_id(),
    };

    tracing::debug!(
        "Starting {:?} upload {} of {} ({} bytes) to {}",
        descriptor.upload_type(),
        id,
        file_path.display(),
        metadata.len(),
        url
    );
    if let Some(notification) = descriptor.notification() {
        tracing::debug!(
            "Upload {} notification settings ignored by this backend: {:?}",
            id,
            notification
        );
    }

    let task = {
        let client = client.clone();
        let uploads = uploads.clone();
        let events = events.clone();
        let id = id.clone();
        async move {
            let result = run_upload(
                &client,
                url,
                &descriptor,
                &file_path,
                chunk_size,
                &id,
                &events,
            )
            .await;

            // Cancelled while finishing: the canceller already reported it
            if uploads.take(&id).is_none() {
                return;
            }

            match result {
                Ok((status, body)) => {
                    tracing::debug!("Upload {} completed with status {}", id, status);
                    events.completed(&id, status, body);
                }
                Err(e) => {
                    tracing::error!("Upload {} failed: {}", id, e);
                    events.error(&id, e.to_string());
                }
            }
        }
    };

    // The lock is held until the entry exists so the task cannot finish unregistered
    let handle = tokio::spawn(task);
    active.insert(id.clone(), ActiveUpload { handle, events });
    drop(active);

    Ok(id)
}

/// Perform the transfer, returning the response status and body
async fn run_upload(
    client: &reqwest::Client,
    url: Url,
    descriptor: &UploadDescriptor,
    file_path: &Path,
    chunk_size: usize,
    id: &UploadId,
    events: &EventEmitter,
) -> Result<(u16, String)> {
    let file = tokio::fs::File::open(file_path).await?;
    let total = file.metadata().await?.len();
    let body = progress_body(file, total, chunk_size, id.clone(), events.clone());

    let mut request = client.request(descriptor.method().as_http(), url);
    for (name, value) in descriptor.headers() {
        request = request.header(name.as_str(), value.as_str());
    }

    request = match descriptor.upload_type() {
        UploadType::Raw => {
            let has_content_type = descriptor
                .headers()
                .keys()
                .any(|name| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                request = request.header(http::header::CONTENT_TYPE, guess_mime_type(file_path));
            }
            request.body(body)
        }
        UploadType::Multipart => {
            let field = descriptor.field().ok_or_else(|| {
                Error::InvalidDescriptor("multipart uploads require a field name".to_string())
            })?;

            // GraphQL multipart servers expect `operations`, then `map`, then files
            let mut parameters: Vec<_> = descriptor.parameters().into_iter().flatten().collect();
            parameters.sort_by_key(|(name, _)| match name.as_str() {
                "operations" => 0,
                "map" => 1,
                _ => 2,
            });

            let mut form = reqwest::multipart::Form::new();
            for (name, value) in parameters {
                form = form.text(name.clone(), value.clone());
            }

            let part = reqwest::multipart::Part::stream_with_length(body, total)
                .file_name(file_name(file_path))
                .mime_str(&guess_mime_type(file_path))
                .map_err(|e| Error::Internal(format!("Invalid content type: {}", e)))?;

            request.multipart(form.part(field.to_string(), part))
        }
    };

    let response = request.send().await.map_err(|e| Error::Connection {
        message: format!("Upload request failed: {}", e),
    })?;

    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| Error::Connection {
        message: format!("Failed to read upload response: {}", e),
    })?;

    Ok((status, body))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string()
}

/// Stream the file in chunks of at most `chunk_size` bytes, reporting progress
/// as each chunk is handed to the connection
fn progress_body(
    file: tokio::fs::File,
    total: u64,
    chunk_size: usize,
    id: UploadId,
    events: EventEmitter,
) -> reqwest::Body {
    let mut sent = 0u64;
    let stream = ReaderStream::with_capacity(file, chunk_size).map(move |chunk| {
        if let Ok(chunk) = &chunk {
            sent += chunk.len() as u64;
            if total > 0 {
                events.progress(&id, sent as f64 * 100.0 / total as f64);
            }
        }
        chunk
    });

    reqwest::Body::wrap_stream(stream)
}
