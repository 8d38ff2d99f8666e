//! Shared types between backend implementations

use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Platform-agnostic single-shot HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method for the request
    pub method: Method,
    /// URL for the request
    pub url: Url,
    /// Headers for the request
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

/// Platform-agnostic HTTP response with a fully read body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What an engine can do beyond plain uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// The host lets the app request extra execution time while backgrounded
    pub supports_background_extension: bool,
}

/// Description of a file on the device.
///
/// A missing file is reported with `exists: false` and, where the path allows
/// it, a best-guess `name` and `extension`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Whether the file exists
    pub exists: bool,
    /// File name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Extension without the leading dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// MIME type guessed from the extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileInfo {
    /// Inspect a plain path or `file://` URI. Never fails.
    pub async fn probe(path: &str) -> Self {
        let Ok(file_path) = resolve_file_path(path) else {
            return Self::default();
        };

        let name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        let extension = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string);

        match tokio::fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_file() => Self {
                exists: true,
                name,
                size: Some(metadata.len()),
                mime_type: Some(guess_mime_type(&file_path)),
                extension,
            },
            _ => Self {
                exists: false,
                name,
                size: None,
                extension,
                mime_type: None,
            },
        }
    }
}

/// Turn a plain path or `file://` URI into a filesystem path
pub fn resolve_file_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(Error::InvalidDescriptor("file path is empty".to_string()));
    }

    if path.starts_with("file:") {
        let url = Url::parse(path)?;
        return url
            .to_file_path()
            .map_err(|_| Error::InvalidDescriptor(format!("not a local file URI: {}", path)));
    }

    Ok(PathBuf::from(path))
}

/// MIME type for a path, `application/octet-stream` when unknown
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_probe_existing_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{\"hello\":1}").unwrap();

        let info = FileInfo::probe(file.path().to_str().unwrap()).await;
        assert!(info.exists);
        assert_eq!(info.size, Some(11));
        assert_eq!(info.extension.as_deref(), Some("json"));
        assert_eq!(info.mime_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_probe_file_uri() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let uri = Url::from_file_path(file.path()).unwrap();

        let info = FileInfo::probe(uri.as_str()).await;
        assert!(info.exists);
        assert_eq!(info.mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");

        let info = FileInfo::probe(missing.to_str().unwrap()).await;
        assert!(!info.exists);
        assert_eq!(info.size, None);
        assert_eq!(info.name.as_deref(), Some("nope.mp4"));
        assert_eq!(info.extension.as_deref(), Some("mp4"));

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["exists"], false);
        assert!(value.get("size").is_none());
    }

    #[test]
    fn test_resolve_rejects_remote_uri() {
        assert!(resolve_file_path("file://example.com/etc/passwd").is_err());
        assert!(resolve_file_path("").is_err());
    }
}
