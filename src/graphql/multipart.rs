//! Splitting one GraphQL multipart request into one upload per file.
//!
//! Every upload carries the same `operations` field and a `map` field that
//! names only its own file, under the positional key that is also the name of
//! its file part. A server that follows the GraphQL multipart request spec
//! reassembles the operation from the parts as they arrive.

use super::GraphqlBody;
use super::extract::{ExtractedFile, ExtractedFiles};
use crate::descriptor::UploadDescriptor;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// The `map` field for a single file: `{"<key>": [paths...]}`
pub fn file_map(key: &str, file: &ExtractedFile) -> HashMap<String, Vec<String>> {
    HashMap::from([(key.to_string(), file.paths().to_vec())])
}

/// Build one multipart descriptor per extracted file.
///
/// Keys are `"0"`, `"1"`, ... in the order the files were found. Any
/// `content-type` in `headers` is dropped since each request sets its own
/// multipart boundary.
pub fn decompose(
    files: &ExtractedFiles,
    body: &GraphqlBody,
    headers: &BTreeMap<String, String>,
    url: &str,
) -> Result<Vec<UploadDescriptor>> {
    let operations = serde_json::to_string(body)?;
    let headers: Vec<(&String, &String)> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
        .collect();

    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let key = index.to_string();
            let location = file.location().ok_or_else(|| {
                Error::InvalidDescriptor(format!(
                    "file at {} has no uri or path",
                    file.paths().join(", ")
                ))
            })?;
            let map = serde_json::to_string(&file_map(&key, file))?;

            UploadDescriptor::builder(url, location)
                .multipart(key)
                .headers(headers.iter().map(|(name, value)| (name.as_str(), value.as_str())))
                .parameter("operations", operations.as_str())
                .parameter("map", map)
                .build()
        })
        .collect()
}
