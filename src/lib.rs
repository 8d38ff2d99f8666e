//! GraphQL multipart uploads over background file-upload engines
//!
//! This crate sends GraphQL operations whose variables contain files. Each
//! file is handed to an upload engine that can keep transferring while the
//! app is suspended, as one request of the
//! [GraphQL multipart request spec](https://github.com/jaydenseric/graphql-multipart-request-spec).
//! The engine reports back through events, which are routed per upload and
//! joined into a single result for the operation.
//!
//! Operations without files are sent as a plain JSON POST.
//!
//! # Backends
//!
//! - **Reqwest** (default, `backend-reqwest` feature): uploads run as detached
//!   tokio tasks and report progress while streaming the file.
//! - Anything else that implements [`UploadEngine`] and [`HttpClient`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub use auth::Auth;
pub use backend::types::{
    EngineCapabilities, FileInfo, HttpRequest, HttpResponse, guess_mime_type, resolve_file_path,
};
pub use backend::{BackendConfig, FALLBACK_REMAINING_BACKGROUND_TIME, HttpClient, UploadEngine};
pub use descriptor::{
    NotificationOptions, UploadDescriptor, UploadDescriptorBuilder, UploadMethod, UploadType,
};
pub use error::{Error, Result};
pub use events::{
    EventEmitter, EventHandler, EventKind, EventRouter, Subscription, UploadEvent, UploadId,
    UploadState,
};
pub use graphql::{GraphqlBody, Operation, OperationContext};
pub use link::{UploadLink, UploadLinkBuilder};
pub use orchestrator::{UploadCallback, UploadCallbacks, UploadTask, run_upload};
pub use registry::UploadRegistry;

#[cfg(feature = "backend-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "backend-reqwest")))]
pub use backend::reqwest::ReqwestBackend;

mod auth;
pub mod backend;
mod descriptor;
mod error;
pub mod events;
pub mod graphql;
mod link;
mod orchestrator;
mod registry;
