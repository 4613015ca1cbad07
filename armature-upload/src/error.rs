//! Upload error types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for upload handling operations.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors raised while collecting uploads or loading constraints.
///
/// These are system faults. Rejected uploads are reported through
/// [`ValidationError`](crate::ValidationError) instead.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Multipart parsing error.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload description could not be decoded.
    #[error("Invalid upload data: {0}")]
    InvalidData(String),

    /// Request carried more file fields than allowed.
    #[error("Too many files: limit is {limit}")]
    TooManyFiles {
        /// Maximum number of file fields.
        limit: usize,
    },
}

impl UploadError {
    /// Check if this is a multipart parsing error.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Convert to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Multipart(_) | Self::InvalidData(_) => 400,
            Self::TooManyFiles { .. } => 413,
            _ => 500,
        }
    }
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        Self::Multipart(err.to_string())
    }
}

/// Transfer status reported by the platform for a single uploaded file.
///
/// The numeric values are the ones web platforms conventionally attach to
/// each file of a multipart submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum UploadErrorCode {
    /// The file arrived intact.
    #[default]
    Ok,
    /// The file exceeds the server-wide size limit.
    IniSize,
    /// The file exceeds the size limit declared by the form.
    FormSize,
    /// The transfer was interrupted.
    Partial,
    /// No file was chosen for the field.
    NoFile,
    /// The temporary directory is missing.
    NoTmpDir,
    /// The file could not be written to disk.
    CantWrite,
    /// A server extension stopped the upload.
    Extension,
    /// A code outside the known set, or a value that is not a code at all.
    Unknown(Option<i64>),
}

impl UploadErrorCode {
    /// Map a raw numeric code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::IniSize,
            2 => Self::FormSize,
            3 => Self::Partial,
            4 => Self::NoFile,
            6 => Self::NoTmpDir,
            7 => Self::CantWrite,
            8 => Self::Extension,
            other => Self::Unknown(Some(other)),
        }
    }

    /// Map a raw attribute value. Integers and integer strings are accepted.
    pub fn from_value(value: &Value) -> Self {
        let code = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        code.map(Self::from_code).unwrap_or(Self::Unknown(None))
    }

    /// The numeric code, if there is one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Ok => Some(0),
            Self::IniSize => Some(1),
            Self::FormSize => Some(2),
            Self::Partial => Some(3),
            Self::NoFile => Some(4),
            Self::NoTmpDir => Some(6),
            Self::CantWrite => Some(7),
            Self::Extension => Some(8),
            Self::Unknown(code) => *code,
        }
    }

    /// Whether the file arrived intact.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Whether the code reports a size limit violation.
    pub fn is_size_exceeded(&self) -> bool {
        matches!(self, Self::IniSize | Self::FormSize)
    }

    /// Human-readable reason shown to the uploader.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ok => "file uploaded successfully.",
            Self::IniSize | Self::FormSize => "uploaded file exceeds the maximum allowed size.",
            Self::Partial => "uploaded file was only partially uploaded. please try again.",
            Self::NoFile => "no file was uploaded.",
            Self::NoTmpDir => "missing a temporary folder.",
            Self::CantWrite => "failed to write file to disk.",
            Self::Extension => "file upload stopped by extension.",
            Self::Unknown(_) => "unknown upload error.",
        }
    }
}

impl From<i64> for UploadErrorCode {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<UploadErrorCode> for i64 {
    fn from(code: UploadErrorCode) -> Self {
        code.code().unwrap_or(-1)
    }
}

impl fmt::Display for UploadErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{}", code),
            None => f.write_str("unknown"),
        }
    }
}
