//! GraphQL operations and the request bodies built from them

pub mod extract;
pub mod multipart;

pub use extract::{ExtractedFile, ExtractedFiles, FilePredicate, extract_files, is_extractable_file};
pub use multipart::{decompose, file_map};

use crate::auth::Auth;
use crate::orchestrator::UploadCallbacks;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Header carrying the client name from [`OperationContext::client_name`]
pub const CLIENT_NAME_HEADER: &str = "apollographql-client-name";
/// Header carrying the client version from [`OperationContext::client_version`]
pub const CLIENT_VERSION_HEADER: &str = "apollographql-client-version";

/// Per-operation settings
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Extra headers for this operation; they win over the link's headers
    pub headers: BTreeMap<String, String>,
    /// Client name sent as `apollographql-client-name`
    pub client_name: Option<String>,
    /// Client version sent as `apollographql-client-version`
    pub client_version: Option<String>,
    /// Upload callbacks for this operation, replacing the link's defaults
    pub callbacks: Option<UploadCallbacks>,
}

/// A GraphQL operation with its query already printed
#[derive(Debug, Clone)]
pub struct Operation {
    /// Printed query document
    pub query: String,
    /// Variables; file values are found and replaced here
    pub variables: Value,
    /// Name of the operation to run
    pub operation_name: Option<String>,
    /// Protocol extensions, sent only when the link includes them
    pub extensions: Option<Value>,
    /// Per-operation settings
    pub context: OperationContext,
}

impl Operation {
    /// Create an operation with no variables
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Value::Object(Default::default()),
            operation_name: None,
            extensions: None,
            context: OperationContext::default(),
        }
    }

    /// Set the variables
    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Set the operation name
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set extensions
    pub fn extensions(mut self, extensions: Value) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Add a context header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.headers.insert(name.into(), value.into());
        self
    }

    /// Set upload callbacks for this operation
    pub fn callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.context.callbacks = Some(callbacks);
        self
    }

    /// Set the client name and version headers
    pub fn client(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.context.client_name = Some(name.into());
        self.context.client_version = Some(version.into());
        self
    }
}

/// The JSON envelope sent to the server: `{query, variables, operationName}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlBody {
    /// Printed query document
    pub query: String,
    /// Variables, with any files replaced by `null`
    pub variables: Value,
    /// Operation name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Extensions, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Build the request body for an operation
pub fn select_body(operation: &Operation, include_extensions: bool) -> GraphqlBody {
    GraphqlBody {
        query: operation.query.clone(),
        variables: operation.variables.clone(),
        operation_name: operation.operation_name.clone(),
        extensions: if include_extensions {
            operation.extensions.clone()
        } else {
            None
        },
    }
}

/// Merge headers for an operation. Names are lowercased; later sources win:
/// link headers, authorization, client awareness, then the operation context.
pub fn merge_headers(
    link_headers: &BTreeMap<String, String>,
    auth: Option<&Auth>,
    context: &OperationContext,
) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = link_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();

    if let Some(auth) = auth {
        headers.insert("authorization".to_string(), auth.to_header_value());
    }
    if let Some(name) = &context.client_name {
        headers.insert(CLIENT_NAME_HEADER.to_string(), name.clone());
    }
    if let Some(version) = &context.client_version {
        headers.insert(CLIENT_VERSION_HEADER.to_string(), version.clone());
    }

    headers.extend(
        context
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone())),
    );

    headers
}
