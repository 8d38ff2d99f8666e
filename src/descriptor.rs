//! Upload task descriptors handed to an upload engine

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP methods an upload engine accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    /// PUT method
    Put,
    /// POST method
    #[default]
    Post,
    /// GET method
    Get,
    /// PATCH method
    Patch,
    /// DELETE method
    Delete,
}

impl UploadMethod {
    /// The equivalent [`http::Method`]
    pub fn as_http(&self) -> http::Method {
        match self {
            UploadMethod::Put => http::Method::PUT,
            UploadMethod::Post => http::Method::POST,
            UploadMethod::Get => http::Method::GET,
            UploadMethod::Patch => http::Method::PATCH,
            UploadMethod::Delete => http::Method::DELETE,
        }
    }
}

/// How the file is placed in the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    /// The file is the whole request body
    #[default]
    Raw,
    /// `multipart/form-data` with the file under `field` plus text `parameters`
    Multipart,
}

/// Tray notification settings, passed through to the engine untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    /// Whether the engine shows a notification at all
    pub enabled: bool,
    /// Remove the notification once the upload finishes
    #[serde(default)]
    pub auto_clear: bool,
    /// Title shown while uploading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_progress_title: Option<String>,
    /// Title shown on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete_title: Option<String>,
    /// Title shown on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_title: Option<String>,
    /// Title shown on cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_cancelled_title: Option<String>,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_clear: false,
            on_progress_title: None,
            on_complete_title: None,
            on_error_title: None,
            on_cancelled_title: None,
        }
    }
}

/// Everything an engine needs to start one background upload.
///
/// Descriptors are immutable once built. A multipart descriptor always carries
/// a `field`; [`UploadDescriptorBuilder::build`] rejects one that does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDescriptor {
    url: String,
    method: UploadMethod,
    #[serde(rename = "type")]
    upload_type: UploadType,
    headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<BTreeMap<String, String>>,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notification: Option<NotificationOptions>,
}

impl UploadDescriptor {
    /// Start building a descriptor for uploading `path` to `url`
    pub fn builder(url: impl Into<String>, path: impl Into<String>) -> UploadDescriptorBuilder {
        UploadDescriptorBuilder::new(url.into(), path.into())
    }

    /// Destination URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method
    pub fn method(&self) -> UploadMethod {
        self.method
    }

    /// Raw or multipart
    pub fn upload_type(&self) -> UploadType {
        self.upload_type
    }

    /// Request headers
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Multipart field name for the file part
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Text parameters sent alongside the file in multipart uploads
    pub fn parameters(&self) -> Option<&BTreeMap<String, String>> {
        self.parameters.as_ref()
    }

    /// File path or `file://` URI
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Caller-chosen upload identifier
    pub fn custom_upload_id(&self) -> Option<&str> {
        self.custom_upload_id.as_deref()
    }

    /// Notification configuration
    pub fn notification(&self) -> Option<&NotificationOptions> {
        self.notification.as_ref()
    }

    /// Re-run the builder checks, e.g. on a descriptor deserialized from elsewhere
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url)?;

        if self.path.is_empty() {
            return Err(Error::InvalidDescriptor("file path is empty".to_string()));
        }

        match (self.upload_type, self.field.as_deref()) {
            (UploadType::Multipart, None) | (UploadType::Multipart, Some("")) => Err(
                Error::InvalidDescriptor("multipart uploads require a field name".to_string()),
            ),
            (UploadType::Raw, _) if self.parameters.is_some() => Err(Error::InvalidDescriptor(
                "parameters are only supported for multipart uploads".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Builder for [`UploadDescriptor`].
///
/// # Examples
///
/// ```rust
/// use graphql_bg_upload::{UploadDescriptor, UploadType};
///
/// # fn main() -> graphql_bg_upload::Result<()> {
/// let descriptor = UploadDescriptor::builder("https://api.example.com/graphql", "/tmp/avatar.png")
///     .multipart("0")
///     .parameter("operations", r#"{"query":"..."}"#)
///     .header("X-Upload-Source", "mobile-app")
///     .build()?;
///
/// assert_eq!(descriptor.upload_type(), UploadType::Multipart);
/// assert_eq!(descriptor.field(), Some("0"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UploadDescriptorBuilder {
    url: String,
    path: String,
    method: UploadMethod,
    upload_type: UploadType,
    headers: BTreeMap<String, String>,
    field: Option<String>,
    parameters: Option<BTreeMap<String, String>>,
    custom_upload_id: Option<String>,
    notification: Option<NotificationOptions>,
}

impl UploadDescriptorBuilder {
    pub(crate) fn new(url: String, path: String) -> Self {
        Self {
            url,
            path,
            method: UploadMethod::Post,
            upload_type: UploadType::Raw,
            headers: BTreeMap::new(),
            field: None,
            parameters: None,
            custom_upload_id: None,
            notification: None,
        }
    }

    /// Set the HTTP method. Defaults to POST.
    pub fn method(mut self, method: UploadMethod) -> Self {
        self.method = method;
        self
    }

    /// Switch to a multipart upload with the file sent under `field`.
    ///
    /// Multipart uploads are always sent with POST.
    pub fn multipart(mut self, field: impl Into<String>) -> Self {
        self.upload_type = UploadType::Multipart;
        self.method = UploadMethod::Post;
        self.field = Some(field.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add every header from `headers`
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

    /// Set the `Authorization` header
    pub fn auth(mut self, auth: &crate::Auth) -> Self {
        self.headers
            .insert("Authorization".to_string(), auth.to_header_value());
        self
    }

    /// Add a multipart text parameter
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Ask the engine to use this identifier instead of generating one
    pub fn custom_upload_id(mut self, id: impl Into<String>) -> Self {
        self.custom_upload_id = Some(id.into());
        self
    }

    /// Set notification options
    pub fn notification(mut self, notification: NotificationOptions) -> Self {
        self.notification = Some(notification);
        self
    }

    /// Validate and build the descriptor
    pub fn build(self) -> Result<UploadDescriptor> {
        let descriptor = UploadDescriptor {
            url: self.url,
            method: self.method,
            upload_type: self.upload_type,
            headers: self.headers,
            field: self.field,
            parameters: self.parameters,
            path: self.path,
            custom_upload_id: self.custom_upload_id,
            notification: self.notification,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_defaults() {
        let descriptor = UploadDescriptor::builder("https://example.com/upload", "/tmp/a.bin")
            .build()
            .unwrap();
        assert_eq!(descriptor.method(), UploadMethod::Post);
        assert_eq!(descriptor.upload_type(), UploadType::Raw);
        assert!(descriptor.field().is_none());
    }

    #[test]
    fn test_multipart_requires_field() {
        let result = UploadDescriptor::builder("https://example.com/upload", "/tmp/a.bin")
            .multipart("")
            .build();
        assert!(matches!(result, Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_parameters_rejected_for_raw() {
        let result = UploadDescriptor::builder("https://example.com/upload", "/tmp/a.bin")
            .parameter("operations", "{}")
            .build();
        assert!(matches!(result, Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_invalid_url() {
        let result = UploadDescriptor::builder("not a url", "/tmp/a.bin").build();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_multipart_forces_post() {
        let descriptor = UploadDescriptor::builder("https://example.com/upload", "/tmp/a.bin")
            .method(UploadMethod::Put)
            .multipart("0")
            .build()
            .unwrap();
        assert_eq!(descriptor.method(), UploadMethod::Post);
    }

    #[test]
    fn test_serializes_native_option_shape() {
        let descriptor = UploadDescriptor::builder("https://example.com/upload", "file:///tmp/a.png")
            .multipart("0")
            .parameter("map", r#"{"0":["variables.file"]}"#)
            .custom_upload_id("abc")
            .build()
            .unwrap();

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["type"], "multipart");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["field"], "0");
        assert_eq!(value["customUploadId"], "abc");
        assert_eq!(value["parameters"]["map"], r#"{"0":["variables.file"]}"#);
        assert!(value.get("notification").is_none());
    }
}
