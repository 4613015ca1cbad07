//! Per-file upload records.

use mime::Mime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::UploadErrorCode;
use crate::field::{Attribute, UploadField, value_to_size, value_to_string};

/// Everything known about one uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Platform transfer status.
    pub error: UploadErrorCode,
    /// Client-declared file name.
    pub name: String,
    /// Temporary storage location.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Client-declared MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl FileRecord {
    /// Create a record for a successfully received file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the transfer status.
    pub fn with_error(mut self, error: UploadErrorCode) -> Self {
        self.error = error;
        self
    }

    /// Set the temporary path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the declared MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Whether the file arrived intact.
    pub fn is_ok(&self) -> bool {
        self.error.is_ok()
    }

    /// Extension of the declared name, as written.
    pub fn extension(&self) -> &str {
        file_extension(&self.name)
    }

    /// The declared MIME type, if it parses.
    pub fn declared_mime(&self) -> Option<Mime> {
        self.mime_type.parse().ok()
    }

    pub(crate) fn attribute_values(&self) -> [(Attribute, Value); 5] {
        [
            (Attribute::Error, Value::from(i64::from(self.error))),
            (Attribute::Name, Value::from(self.name.clone())),
            (
                Attribute::Path,
                Value::from(self.path.to_string_lossy().into_owned()),
            ),
            (Attribute::Size, Value::from(self.size)),
            (Attribute::Type, Value::from(self.mime_type.clone())),
        ]
    }
}

/// Extension of a file name: the text after the last `.` of its final path
/// component, or an empty string when there is none.
pub fn file_extension(name: &str) -> &str {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or(name);

    base.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

/// File-major view of an upload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileData {
    /// Single-file submission.
    Single(FileRecord),
    /// Multi-file submission, one record per declared name.
    Multiple(Vec<FileRecord>),
}

impl FileData {
    /// Build the records of `field`.
    ///
    /// Multi-file submissions are transposed: record `i` holds entry `i` of
    /// every attribute. The record count follows the `name` attribute;
    /// entries missing from shorter attributes read as zero values and
    /// surplus entries are dropped.
    pub fn from_field(field: &UploadField<'_>) -> Self {
        if !field.is_multiple() {
            return Self::Single(FileRecord {
                error: field.error().into_vec().remove(0),
                name: field.name().into_vec().remove(0),
                path: field.path().into_vec().remove(0),
                size: field.size().into_vec().remove(0),
                mime_type: field.mime_type().into_vec().remove(0),
            });
        }

        let names = field.raw_values(Attribute::Name);
        let errors = field.raw_values(Attribute::Error);
        let paths = field.raw_values(Attribute::Path);
        let sizes = field.raw_values(Attribute::Size);
        let types = field.raw_values(Attribute::Type);

        let count = names.len();
        for attribute in Attribute::ALL {
            let len = field.raw_values(attribute).len();
            if len != count {
                warn!(
                    handle = %field.handle(),
                    attribute = attribute.key(),
                    expected = count,
                    actual = len,
                    "Upload attribute length mismatch"
                );
            }
        }

        let records = names
            .iter()
            .enumerate()
            .map(|(i, name)| FileRecord {
                error: errors
                    .get(i)
                    .map(|v| UploadErrorCode::from_value(v))
                    .unwrap_or_default(),
                name: value_to_string(name),
                path: paths
                    .get(i)
                    .map(|v| PathBuf::from(value_to_string(v)))
                    .unwrap_or_default(),
                size: sizes.get(i).map(|v| value_to_size(v)).unwrap_or(0),
                mime_type: types.get(i).map(|v| value_to_string(v)).unwrap_or_default(),
            })
            .collect();

        Self::Multiple(records)
    }

    /// Whether this came from a multi-file submission.
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    /// View the records as a slice.
    pub fn as_slice(&self) -> &[FileRecord] {
        match self {
            Self::Single(record) => std::slice::from_ref(record),
            Self::Multiple(records) => records,
        }
    }

    /// Iterate over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.as_slice().iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize into a vector of records.
    pub fn into_vec(self) -> Vec<FileRecord> {
        match self {
            Self::Single(record) => vec![record],
            Self::Multiple(records) => records,
        }
    }
}
