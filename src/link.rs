//! GraphQL transport link with background file uploads

use crate::auth::Auth;
use crate::backend::types::HttpRequest;
use crate::backend::{HttpClient, UploadEngine};
use crate::events::UploadId;
use crate::graphql::{
    FilePredicate, GraphqlBody, Operation, decompose, extract_files, is_extractable_file,
    merge_headers, select_body,
};
use crate::orchestrator::{UploadCallbacks, UploadTask};
use crate::registry::UploadRegistry;
use crate::{Error, Result};
use bytes::Bytes;
use futures_util::future::{join_all, try_join_all};
use futures_util::stream::{self, Stream, StreamExt};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Sends GraphQL operations, uploading any files in their variables through
/// an upload engine.
///
/// Operations without files go out as one JSON POST through the HTTP client.
/// Operations with files become one multipart upload per distinct file; the
/// operation succeeds once every upload has completed, and fails with the
/// first upload error.
///
/// # Examples
///
/// ```rust,no_run
/// use graphql_bg_upload::{Operation, ReqwestBackend, UploadLinkBuilder};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> graphql_bg_upload::Result<()> {
/// let backend = ReqwestBackend::new()?;
/// let link = UploadLinkBuilder::new("https://api.example.com/graphql")
///     .header("X-App", "gallery")
///     .build(backend.clone(), backend)?;
///
/// let operation = Operation::new("mutation($avatar: Upload!) { setAvatar(file: $avatar) { id } }")
///     .variables(json!({"avatar": {"uri": "file:///tmp/avatar.png", "type": "image/png"}}));
///
/// let results = link.execute(operation).await?;
/// println!("{:?}", results);
/// # Ok(())
/// # }
/// ```
pub struct UploadLink<E, H> {
    url: Url,
    registry: UploadRegistry<E>,
    http: Arc<H>,
    headers: BTreeMap<String, String>,
    auth: Option<Auth>,
    include_extensions: bool,
    is_file: FilePredicate,
    cancel_siblings_on_failure: bool,
    callbacks: UploadCallbacks,
}

impl<E: UploadEngine, H: HttpClient> UploadLink<E, H> {
    /// Create a link builder
    pub fn builder(uri: impl Into<String>) -> UploadLinkBuilder {
        UploadLinkBuilder::new(uri)
    }

    /// The registry uploads are started through
    pub fn registry(&self) -> &UploadRegistry<E> {
        &self.registry
    }

    /// Destination of every request
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Run an operation, returning one result per request made: a single
    /// value without files, or one per file in the order files were found.
    pub async fn execute(&self, mut operation: Operation) -> Result<Vec<Value>> {
        let files = extract_files(&mut operation.variables, "variables", self.is_file.as_ref());
        let body = select_body(&operation, self.include_extensions);
        let headers = merge_headers(&self.headers, self.auth.as_ref(), &operation.context);

        if files.is_empty() {
            return self.fetch(&body, &headers).await.map(|value| vec![value]);
        }

        let descriptors = decompose(&files, &body, &headers, self.url.as_str())?;
        let callbacks = operation
            .context
            .callbacks
            .clone()
            .unwrap_or_else(|| self.callbacks.clone());

        tracing::debug!(
            "Uploading {} file(s) for operation {}",
            descriptors.len(),
            body.operation_name.as_deref().unwrap_or("<anonymous>")
        );

        let started = join_all(
            descriptors
                .into_iter()
                .map(|descriptor| UploadTask::start(&self.registry, descriptor, callbacks.clone())),
        )
        .await;

        let mut tasks = Vec::with_capacity(started.len());
        let mut start_error = None;
        for result in started {
            match result {
                Ok(task) => tasks.push(task),
                Err(e) if start_error.is_none() => start_error = Some(e),
                Err(e) => tracing::warn!("Additional upload failed to start: {}", e),
            }
        }

        let ids: Vec<UploadId> = tasks.iter().map(|task| task.id().clone()).collect();

        if let Some(e) = start_error {
            tracing::error!("Upload failed to start: {}", e);
            drop(tasks);
            self.abandon(&ids).await;
            return Err(e);
        }

        match try_join_all(tasks.into_iter().map(|task| task.finish(&self.registry))).await {
            Ok(values) => {
                self.registry.can_suspend_if_background();
                Ok(values)
            }
            Err(e) => {
                tracing::error!("Upload failed: {}", e);
                self.abandon(&ids).await;
                Err(e)
            }
        }
    }

    /// Run an operation as a stream: its result values in order, or a single error
    pub fn execute_stream(&self, operation: Operation) -> impl Stream<Item = Result<Value>> + '_ {
        stream::once(self.execute(operation)).flat_map(|result| {
            let items: Vec<Result<Value>> = match result {
                Ok(values) => values.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
    }

    async fn fetch(&self, body: &GraphqlBody, headers: &BTreeMap<String, String>) -> Result<Value> {
        let mut header_map = to_header_map(headers)?;
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = HttpRequest {
            method: http::Method::POST,
            url: self.url.clone(),
            headers: header_map,
            body: Bytes::from(serde_json::to_vec(body)?),
        };

        let response = self.http.execute(request).await?;
        if !response.status.is_success() {
            return Err(Error::Http {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        serde_json::from_slice(&response.body).map_err(|source| Error::MalformedResponse {
            body: response.text(),
            source,
        })
    }

    /// Nobody waits on the uploads of a failed operation any more
    async fn abandon(&self, ids: &[UploadId]) {
        for id in ids {
            self.registry.discard(id);
        }

        if !self.cancel_siblings_on_failure {
            return;
        }

        for id in ids {
            match self.registry.cancel_upload(id).await {
                Ok(cancelled) => tracing::debug!("Cancelled sibling upload {}: {}", id, cancelled),
                Err(e) => tracing::warn!("Failed to cancel sibling upload {}: {}", id, e),
            }
        }
    }
}

impl<E, H> fmt::Debug for UploadLink<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadLink")
            .field("url", &self.url.as_str())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("include_extensions", &self.include_extensions)
            .field("cancel_siblings_on_failure", &self.cancel_siblings_on_failure)
            .finish()
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidArgument(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| {
                Error::InvalidArgument(format!("Invalid value for header {}: {}", name.as_str(), e))
            })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Builder for [`UploadLink`]
pub struct UploadLinkBuilder {
    uri: String,
    headers: BTreeMap<String, String>,
    auth: Option<Auth>,
    include_extensions: bool,
    is_file: FilePredicate,
    cancel_siblings_on_failure: bool,
    callbacks: UploadCallbacks,
}

impl UploadLinkBuilder {
    /// Create a builder for a link sending to `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: BTreeMap::new(),
            auth: None,
            include_extensions: false,
            is_file: Arc::new(is_extractable_file),
            cancel_siblings_on_failure: false,
            callbacks: UploadCallbacks::default(),
        }
    }

    /// Add a header sent with every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add several headers sent with every request
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Authenticate every request
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Send operation extensions in the request body. Off by default.
    pub fn include_extensions(mut self, include: bool) -> Self {
        self.include_extensions = include;
        self
    }

    /// Replace the test used to find files in variables
    pub fn is_extractable_file<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.is_file = Arc::new(predicate);
        self
    }

    /// Cancel the other uploads of an operation when one of them fails.
    ///
    /// Off by default: the remaining uploads keep running and their results
    /// are discarded.
    pub fn cancel_siblings_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_siblings_on_failure = cancel;
        self
    }

    /// Callbacks used for operations that do not bring their own
    pub fn callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Build a link over an upload engine and an HTTP client
    pub fn build<E: UploadEngine, H: HttpClient>(self, engine: E, http: H) -> Result<UploadLink<E, H>> {
        self.build_with_registry(UploadRegistry::new(engine), http)
    }

    /// Build a link that starts uploads through an existing registry
    pub fn build_with_registry<E: UploadEngine, H: HttpClient>(
        self,
        registry: UploadRegistry<E>,
        http: H,
    ) -> Result<UploadLink<E, H>> {
        let url = Url::parse(&self.uri)?;
        to_header_map(&self.headers)?;

        Ok(UploadLink {
            url,
            registry,
            http: Arc::new(http),
            headers: self.headers,
            auth: self.auth,
            include_extensions: self.include_extensions,
            is_file: self.is_file,
            cancel_siblings_on_failure: self.cancel_siblings_on_failure,
            callbacks: self.callbacks,
        })
    }
}

impl fmt::Debug for UploadLinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadLinkBuilder")
            .field("uri", &self.uri)
            .field("include_extensions", &self.include_extensions)
            .finish()
    }
}
