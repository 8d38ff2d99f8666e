//! Finding file values inside GraphQL variables.
//!
//! Paths use the dotted form of the GraphQL multipart request spec:
//! `variables.avatar`, `variables.photos.1`. A file referenced from several
//! places is recorded once with all of its paths. JSON values have no
//! identity, so "the same file" means an equal value.

use serde_json::Value;
use std::sync::Arc;

/// Decides whether a value is a file to upload
pub type FilePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// URI schemes that always point at a file on the device
const LOCAL_SCHEMES: [&str; 2] = ["file:", "content:"];

/// Default file test: the object mobile file pickers hand out. It has a
/// string `uri` and either string `name` and `type` fields or a `uri` with a
/// local scheme (`file:`, `content:`).
pub fn is_extractable_file(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let Some(uri) = object.get("uri").and_then(Value::as_str) else {
        return false;
    };

    let described = ["name", "type"]
        .iter()
        .all(|key| object.get(*key).is_some_and(Value::is_string));
    let local = LOCAL_SCHEMES.iter().any(|scheme| {
        uri.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });

    described || local
}

/// One distinct file and everywhere it occurred
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFile {
    file: Value,
    paths: Vec<String>,
}

impl ExtractedFile {
    /// The file value as it appeared in the variables
    pub fn file(&self) -> &Value {
        &self.file
    }

    /// Every path the file occurred at, in traversal order
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Where the file lives on the device: `uri`, then `path`, or the value
    /// itself when it is a plain string
    pub fn location(&self) -> Option<&str> {
        match &self.file {
            Value::String(location) => Some(location),
            Value::Object(object) => object
                .get("uri")
                .or_else(|| object.get("path"))
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Files found in one operation, in order of first occurrence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFiles {
    files: Vec<ExtractedFile>,
}

impl ExtractedFiles {
    /// Number of distinct files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files were found
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate the files in order of first occurrence
    pub fn iter(&self) -> std::slice::Iter<'_, ExtractedFile> {
        self.files.iter()
    }

    fn record(&mut self, file: Value, path: String) {
        match self.files.iter_mut().find(|entry| entry.file == file) {
            Some(entry) => entry.paths.push(path),
            None => self.files.push(ExtractedFile {
                file,
                paths: vec![path],
            }),
        }
    }
}

impl<'a> IntoIterator for &'a ExtractedFiles {
    type Item = &'a ExtractedFile;
    type IntoIter = std::slice::Iter<'a, ExtractedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Replace every file in `value` with `null`, returning the files and their paths.
///
/// `prefix` is the path of `value` itself, e.g. `"variables"`. Arrays and
/// objects are walked; values the predicate accepts are not looked into.
/// `value` itself is never taken as a file.
pub fn extract_files(
    value: &mut Value,
    prefix: &str,
    is_file: &(dyn Fn(&Value) -> bool + Send + Sync),
) -> ExtractedFiles {
    let mut files = ExtractedFiles::default();
    descend(value, prefix, is_file, &mut files);
    files
}

fn walk(
    value: &mut Value,
    path: String,
    is_file: &(dyn Fn(&Value) -> bool + Send + Sync),
    files: &mut ExtractedFiles,
) {
    if is_file(value) {
        files.record(value.take(), path);
        return;
    }

    descend(value, &path, is_file, files);
}

fn descend(
    value: &mut Value,
    path: &str,
    is_file: &(dyn Fn(&Value) -> bool + Send + Sync),
    files: &mut ExtractedFiles,
) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                walk(item, join(path, &index.to_string()), is_file, files);
            }
        }
        Value::Object(object) => {
            for (key, item) in object.iter_mut() {
                walk(item, join(path, key), is_file, files);
            }
        }
        _ => {}
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contains_file(value: &Value) -> bool {
        if is_extractable_file(value) {
            return true;
        }
        match value {
            Value::Array(items) => items.iter().any(contains_file),
            Value::Object(object) => object.values().any(contains_file),
            _ => false,
        }
    }

    #[test]
    fn test_no_files() {
        let mut variables = json!({"name": "x", "tags": ["a", "b"]});
        let before = variables.clone();

        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert!(files.is_empty());
        assert_eq!(variables, before);
    }

    #[test]
    fn test_single_file() {
        let mut variables = json!({
            "avatar": {"uri": "file:///tmp/a.png", "name": "a.png", "type": "image/png"},
            "tags": ["a", "b"],
        });

        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert_eq!(files.len(), 1);

        let file = files.iter().next().unwrap();
        assert_eq!(file.paths(), ["variables.avatar"]);
        assert_eq!(file.location(), Some("file:///tmp/a.png"));
        assert_eq!(variables, json!({"avatar": null, "tags": ["a", "b"]}));
    }

    #[test]
    fn test_nested_and_shared_files() {
        let photo = json!({"uri": "file:///tmp/p.jpg"});
        let doc = json!({"uri": "file:///tmp/d.pdf"});
        let mut variables = json!({
            "input": {
                "cover": photo.clone(),
                "gallery": [photo.clone(), doc.clone(), {"caption": "x", "image": doc.clone()}],
            }
        });

        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert_eq!(files.len(), 2);

        let total_paths: usize = files.iter().map(|file| file.paths().len()).sum();
        assert_eq!(total_paths, 4);

        let photo_entry = files.iter().find(|file| file.file() == &photo).unwrap();
        assert_eq!(
            photo_entry.paths(),
            ["variables.input.cover", "variables.input.gallery.0"]
        );
        let doc_entry = files.iter().find(|file| file.file() == &doc).unwrap();
        assert_eq!(
            doc_entry.paths(),
            ["variables.input.gallery.1", "variables.input.gallery.2.image"]
        );

        assert!(!contains_file(&variables));
        assert_eq!(variables["input"]["gallery"][2]["caption"], "x");
    }

    #[test]
    fn test_custom_predicate_on_strings() {
        let mut variables = json!({"upload": "file:///tmp/raw.bin", "note": "hello"});
        let is_file_uri = |value: &Value| value.as_str().is_some_and(|s| s.starts_with("file://"));

        let files = extract_files(&mut variables, "variables", &is_file_uri);
        assert_eq!(files.len(), 1);
        let file = files.iter().next().unwrap();
        assert_eq!(file.location(), Some("file:///tmp/raw.bin"));
        assert_eq!(variables, json!({"upload": null, "note": "hello"}));
    }

    #[test]
    fn test_uri_variable_is_not_a_file() {
        let mut variables = json!({"uri": "https://example.com/page"});
        let before = variables.clone();

        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert!(files.is_empty());
        assert_eq!(variables, before);
    }

    #[test]
    fn test_root_is_never_extracted() {
        let mut variables = json!({"uri": "file:///tmp/a.png", "name": "a.png", "type": "image/png"});
        let before = variables.clone();

        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert!(files.is_empty());
        assert_eq!(variables, before);
    }

    #[test]
    fn test_default_file_shapes() {
        assert!(is_extractable_file(&json!({"uri": "file:///tmp/a.png"})));
        assert!(is_extractable_file(&json!({"uri": "content://media/external/images/1"})));
        assert!(is_extractable_file(
            &json!({"uri": "/tmp/a.png", "name": "a.png", "type": "image/png"})
        ));
        assert!(!is_extractable_file(&json!({"uri": "https://example.com/a.png"})));
        assert!(!is_extractable_file(&json!({"uri": "/tmp/a.png", "name": "a.png"})));
        assert!(!is_extractable_file(&json!({"uri": 42})));
        assert!(!is_extractable_file(&json!("file:///tmp/a.png")));
    }

    #[test]
    fn test_does_not_walk_into_files() {
        let mut variables = json!({"file": {"uri": "file:///a", "thumb": {"uri": "file:///b"}}});
        let files = extract_files(&mut variables, "variables", &is_extractable_file);
        assert_eq!(files.len(), 1);
    }
}
