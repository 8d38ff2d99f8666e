//! Reqwest backend: cross-platform HTTP and background uploads

mod background;

use crate::backend::types::{EngineCapabilities, FileInfo, HttpRequest, HttpResponse};
use crate::backend::{BackendConfig, HttpClient, UploadEngine};
use crate::descriptor::UploadDescriptor;
use crate::events::{EventEmitter, UploadId};
use crate::{Error, Result};
use background::ActiveUploads;

/// Default slice size used to stream files and report progress
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reqwest backend for cross-platform HTTP.
///
/// Uploads run as detached tokio tasks: they keep going after the future that
/// started them is dropped and report back only through events. There is no
/// OS-level background extension on this backend.
#[derive(Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    uploads: ActiveUploads,
    chunk_size: usize,
}

impl ReqwestBackend {
    /// Create a new Reqwest backend
    pub fn new() -> Result<Self> {
        Self::with_config(BackendConfig::default())
    }

    /// Create a new Reqwest backend with configuration
    pub fn with_config(config: BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(default_headers) = config.default_headers {
            builder = builder.default_headers(default_headers);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create reqwest client: {}", e)))?;

        Ok(Self {
            client,
            uploads: ActiveUploads::default(),
            chunk_size: config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
        })
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Number of uploads still running
    pub fn active_uploads(&self) -> usize {
        self.uploads.len()
    }
}

impl HttpClient for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| Error::Connection {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| Error::Connection {
            message: format!("Failed to read response body: {}", e),
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl UploadEngine for ReqwestBackend {
    async fn start_upload(
        &self,
        descriptor: UploadDescriptor,
        events: EventEmitter,
    ) -> Result<UploadId> {
        background::start_upload(
            &self.client,
            &self.uploads,
            self.chunk_size,
            descriptor,
            events,
        )
        .await
    }

    async fn cancel_upload(&self, id: &UploadId) -> Result<bool> {
        Ok(self.uploads.cancel(id))
    }

    async fn file_info(&self, path: &str) -> FileInfo {
        FileInfo::probe(path).await
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_background_extension: false,
        }
    }
}
