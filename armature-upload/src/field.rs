//! Attribute-major upload data and the per-field accessor.
//!
//! A request's uploads are described per handle as a map of five
//! attributes (`error`, `name`, `path`, `size`, `type`). A single-file
//! submission stores a scalar under each attribute; a multi-file submission
//! stores index-aligned arrays:
//!
//! ```json
//! {
//!   "avatar": {
//!     "error": 0, "name": "me.png", "path": "/tmp/upload-1", "size": 512, "type": "image/png"
//!   },
//!   "photos": {
//!     "error": [0, 0],
//!     "name": ["a.jpg", "b.jpg"],
//!     "path": ["/tmp/upload-2", "/tmp/upload-3"],
//!     "size": [1024, 2048],
//!     "type": ["image/jpeg", "image/jpeg"]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::{FileData, FileRecord, Result, UploadError, UploadErrorCode};

/// One of the five per-file attributes of an upload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Platform transfer status.
    Error,
    /// Client-declared file name.
    Name,
    /// Temporary storage location.
    Path,
    /// Size in bytes.
    Size,
    /// Client-declared MIME type.
    Type,
}

impl Attribute {
    /// All attributes, in record order.
    pub const ALL: [Attribute; 5] = [
        Attribute::Error,
        Attribute::Name,
        Attribute::Path,
        Attribute::Size,
        Attribute::Type,
    ];

    /// Key used in the upload description.
    pub fn key(&self) -> &'static str {
        match self {
            Attribute::Error => "error",
            Attribute::Name => "name",
            Attribute::Path => "path",
            Attribute::Size => "size",
            Attribute::Type => "type",
        }
    }
}

/// An attribute value in the shape it was submitted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UploadValue<T> {
    /// Single-file submission.
    Single(T),
    /// Multi-file submission, one entry per file.
    Multiple(Vec<T>),
}

impl<T> UploadValue<T> {
    /// Whether the value came from a multi-file submission.
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    /// View the value as a slice (length 1 for single submissions).
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        }
    }

    /// Iterate over the per-file values.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Number of per-file values.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether there are no values (only possible for multi-file submissions).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scalar of a single-file submission.
    pub fn single(&self) -> Option<&T> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(_) => None,
        }
    }

    /// Normalize into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Single(value) => vec![value],
            Self::Multiple(values) => values,
        }
    }
}

/// The upload description of one request, keyed by handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadedFiles {
    data: Value,
}

impl UploadedFiles {
    /// Create an empty description.
    pub fn new() -> Self {
        Self {
            data: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing attribute-major description.
    pub fn from_value(data: Value) -> Self {
        Self { data }
    }

    /// Decode a description from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self::from_value)
            .map_err(|e| UploadError::InvalidData(e.to_string()))
    }

    /// Descend the description along `path`, one map key per segment.
    ///
    /// Returns `None` as soon as a segment is missing or the current node is
    /// not a map.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.data, |node, key| node.get(*key))
    }

    /// Accessor for one handle.
    pub fn field(&self, handle: impl Into<String>) -> UploadField<'_> {
        UploadField::new(self, handle)
    }

    /// Whether anything was submitted under `handle`.
    pub fn contains(&self, handle: &str) -> bool {
        self.lookup(&[handle]).is_some()
    }

    /// Handles present in the description.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.data
            .as_object()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }

    /// Append a file under `handle`.
    ///
    /// With `multiple` set, attributes are stored as arrays even for the
    /// first file. A handle that already holds a single file is promoted to
    /// the multi-file shape.
    pub fn push(&mut self, handle: &str, record: FileRecord, multiple: bool) {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        let Some(root) = self.data.as_object_mut() else {
            return;
        };

        let values = record.attribute_values();
        match root.get_mut(handle) {
            Some(Value::Object(entry)) => {
                for (attribute, value) in values {
                    let slot = entry
                        .entry(attribute.key())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    match slot {
                        Value::Array(items) => items.push(value),
                        scalar => {
                            let previous = scalar.take();
                            *scalar = Value::Array(vec![previous, value]);
                        }
                    }
                }
            }
            _ => {
                let entry: Map<String, Value> = values
                    .into_iter()
                    .map(|(attribute, value)| {
                        let value = if multiple {
                            Value::Array(vec![value])
                        } else {
                            value
                        };
                        (attribute.key().to_string(), value)
                    })
                    .collect();
                root.insert(handle.to_string(), Value::Object(entry));
            }
        }
    }

    /// Borrow the raw description.
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    /// Consume and return the raw description.
    pub fn into_value(self) -> Value {
        self.data
    }
}

impl From<Value> for UploadedFiles {
    fn from(data: Value) -> Self {
        Self::from_value(data)
    }
}

/// Typed, shape-aware view of one upload field.
#[derive(Debug, Clone)]
pub struct UploadField<'a> {
    files: &'a UploadedFiles,
    handle: String,
}

impl<'a> UploadField<'a> {
    /// Create an accessor for `handle`.
    pub fn new(files: &'a UploadedFiles, handle: impl Into<String>) -> Self {
        Self {
            files,
            handle: handle.into(),
        }
    }

    /// The field name.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Raw attribute value, if present.
    pub fn raw(&self, attribute: Attribute) -> Option<&'a Value> {
        self.files.lookup(&[self.handle.as_str(), attribute.key()])
    }

    /// Raw attribute values normalized to a list: absent and `null` give an
    /// empty list, scalars a list of one. A scalar error attribute holding an
    /// empty string counts as absent.
    pub fn raw_values(&self, attribute: Attribute) -> Vec<&'a Value> {
        match self.raw(attribute) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(s)) if s.is_empty() && attribute == Attribute::Error => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(value) => vec![value],
        }
    }

    /// Whether a file was actually submitted.
    ///
    /// False when no error codes were reported or when any of them is the
    /// "no file" code.
    pub fn has_upload(&self) -> bool {
        let codes = self.error_codes();
        !codes.is_empty() && !codes.contains(&UploadErrorCode::NoFile)
    }

    /// Whether the field was submitted in the multi-file shape.
    pub fn is_multiple(&self) -> bool {
        matches!(self.raw(Attribute::Name), Some(Value::Array(names)) if !names.is_empty())
    }

    /// Platform error code(s).
    pub fn error(&self) -> UploadValue<UploadErrorCode> {
        self.shaped(Attribute::Error, UploadErrorCode::from_value)
    }

    /// Every reported error code, whatever the shape of the other attributes.
    pub fn error_codes(&self) -> Vec<UploadErrorCode> {
        self.raw_values(Attribute::Error)
            .into_iter()
            .map(UploadErrorCode::from_value)
            .collect()
    }

    /// Declared file name(s).
    pub fn name(&self) -> UploadValue<String> {
        self.shaped(Attribute::Name, value_to_string)
    }

    /// Temporary path(s).
    pub fn path(&self) -> UploadValue<PathBuf> {
        self.shaped(Attribute::Path, |value| PathBuf::from(value_to_string(value)))
    }

    /// Size(s) in bytes. Malformed or negative values read as zero.
    pub fn size(&self) -> UploadValue<u64> {
        self.shaped(Attribute::Size, value_to_size)
    }

    /// Declared MIME type(s).
    pub fn mime_type(&self) -> UploadValue<String> {
        self.shaped(Attribute::Type, value_to_string)
    }

    /// Per-file records. See [`FileData`].
    pub fn file_data(&self) -> FileData {
        FileData::from_field(self)
    }

    fn shaped<T, F>(&self, attribute: Attribute, convert: F) -> UploadValue<T>
    where
        T: Default,
        F: Fn(&Value) -> T,
    {
        let values = self.raw_values(attribute);
        if self.is_multiple() {
            UploadValue::Multiple(values.into_iter().map(convert).collect())
        } else {
            UploadValue::Single(values.first().copied().map(convert).unwrap_or_default())
        }
    }
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn value_to_size(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(|n| n.max(0) as u64)
                .or_else(|_| s.parse::<f64>().map(|f| if f > 0.0 { f as u64 } else { 0 }))
                .unwrap_or(0)
        }
        _ => 0,
    }
}
