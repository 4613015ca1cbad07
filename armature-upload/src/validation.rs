//! Upload field validation.

use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::{
    ContentSniffer, FileData, FileRecord, MimeResolver, UploadConstraints, UploadErrorCode,
    UploadField, UploadedFiles, type_category,
};

/// Why an upload was rejected. The display text is the reason shown to the
/// uploader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing was submitted for the field.
    #[error("please upload a file.")]
    NoUpload,

    /// The platform reported a transfer failure.
    #[error("{}", .0.message())]
    Platform(UploadErrorCode),

    /// Content type or type category not allowed.
    #[error("invalid file type.")]
    InvalidType {
        /// The detected MIME type, if any.
        detected: Option<String>,
    },

    /// File extension not allowed.
    #[error("invalid file extension.")]
    InvalidExtension {
        /// The offending extension.
        extension: String,
    },
}

impl ValidationError {
    /// The reason shown to the uploader.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// The platform code behind this error, if any.
    pub fn code(&self) -> Option<UploadErrorCode> {
        match self {
            Self::Platform(code) => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a platform transfer error.
    pub fn is_platform(&self) -> bool {
        matches!(self, Self::Platform(_))
    }

    /// Convert to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Platform(code) if code.is_size_exceeded() => 413,
            Self::Platform(UploadErrorCode::NoTmpDir | UploadErrorCode::CantWrite) => 500,
            _ => 400,
        }
    }
}

/// Result of validating an upload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every check passed.
    Valid,
    /// The first failing check.
    Invalid(ValidationError),
}

impl ValidationOutcome {
    /// Whether every check passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<String> {
        self.error().map(ValidationError::reason)
    }

    /// The rejection, if any.
    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            Self::Valid => None,
            Self::Invalid(e) => Some(e),
        }
    }

    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid(e) => Err(e),
        }
    }
}

impl From<Result<(), ValidationError>> for ValidationOutcome {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => Self::Valid,
            Err(e) => Self::Invalid(e),
        }
    }
}

/// A content check applied to every file of a field.
pub trait ValidationRule: Send + Sync {
    /// Validate one file. `detected` is the resolved MIME type.
    fn validate(&self, file: &FileRecord, detected: Option<&str>) -> Result<(), ValidationError>;

    /// Rule description for log output.
    fn description(&self) -> &str;

    /// Whether the rule needs the resolved MIME type.
    fn needs_mime(&self) -> bool {
        false
    }
}

struct AllowedMimeTypesRule<'c>(&'c HashSet<String>);

impl ValidationRule for AllowedMimeTypesRule<'_> {
    fn validate(&self, _file: &FileRecord, detected: Option<&str>) -> Result<(), ValidationError> {
        match detected {
            Some(mime) if self.0.contains(&mime.to_lowercase()) => Ok(()),
            _ => Err(ValidationError::InvalidType {
                detected: detected.map(String::from),
            }),
        }
    }

    fn description(&self) -> &str {
        "Allowed MIME types"
    }

    fn needs_mime(&self) -> bool {
        true
    }
}

struct AllowedCategoriesRule<'c>(&'c HashSet<String>);

impl ValidationRule for AllowedCategoriesRule<'_> {
    fn validate(&self, _file: &FileRecord, detected: Option<&str>) -> Result<(), ValidationError> {
        match detected {
            Some(mime) if self.0.contains(&type_category(mime)) => Ok(()),
            _ => Err(ValidationError::InvalidType {
                detected: detected.map(String::from),
            }),
        }
    }

    fn description(&self) -> &str {
        "Allowed type categories"
    }

    fn needs_mime(&self) -> bool {
        true
    }
}

struct AllowedExtensionsRule<'c>(&'c HashSet<String>);

impl ValidationRule for AllowedExtensionsRule<'_> {
    fn validate(&self, file: &FileRecord, _detected: Option<&str>) -> Result<(), ValidationError> {
        let extension = file.extension();
        if self.0.contains(&extension.to_lowercase()) {
            Ok(())
        } else {
            Err(ValidationError::InvalidExtension {
                extension: extension.to_string(),
            })
        }
    }

    fn description(&self) -> &str {
        "Allowed file extensions"
    }
}

/// Validates one upload field against allow-lists of MIME types, type
/// categories and extensions.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. a file was submitted,
/// 2. no file reports a platform transfer error,
/// 3. every file's detected MIME type is allowed,
/// 4. every file's detected type category is allowed,
/// 5. every file's declared extension is allowed.
///
/// Checks 3 to 5 only run when their allow-list is non-empty.
///
/// ```
/// use armature_upload::{UploadValidator, UploadedFiles};
/// use serde_json::json;
///
/// let files = UploadedFiles::from_value(json!({
///     "avatar": {
///         "error": 0, "name": "me.png", "path": "/tmp/upload-1", "size": 512, "type": "image/png"
///     }
/// }));
///
/// let validator = UploadValidator::new(&files, "avatar")
///     .add_allowed_file_extension(["jpg", "png"])
///     .add_allowed_mime_type(["image/png"])
///     .with_resolver(|_: &std::path::Path| Some("image/png".to_string()));
///
/// assert!(validator.is_valid().is_valid());
/// ```
pub struct UploadValidator<'a> {
    field: UploadField<'a>,
    constraints: UploadConstraints,
    resolver: Box<dyn MimeResolver>,
}

impl<'a> UploadValidator<'a> {
    /// Create a validator for `handle` with no restrictions.
    pub fn new(files: &'a UploadedFiles, handle: impl Into<String>) -> Self {
        Self {
            field: UploadField::new(files, handle),
            constraints: UploadConstraints::default(),
            resolver: Box::new(ContentSniffer),
        }
    }

    /// Use a different MIME resolver.
    pub fn with_resolver(mut self, resolver: impl MimeResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Add every value of a loaded constraint set.
    pub fn with_constraints(mut self, constraints: UploadConstraints) -> Self {
        self.constraints.merge(constraints);
        self
    }

    /// Allow file extensions (case-insensitive, leading dot optional).
    pub fn add_allowed_file_extension<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.constraints.add_extensions(extensions);
        self
    }

    /// Allow type categories such as `image` or `video`.
    pub fn add_allowed_file_type<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.constraints.add_type_categories(categories);
        self
    }

    /// Allow full MIME types.
    pub fn add_allowed_mime_type<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.constraints.add_mime_types(mime_types);
        self
    }

    /// Only allow images.
    pub fn images_only(self) -> Self {
        self.add_allowed_file_type(["image"])
    }

    /// Only allow common document formats.
    pub fn documents_only(self) -> Self {
        self.add_allowed_mime_type([
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "text/plain",
            "text/csv",
        ])
    }

    /// The validated field name.
    pub fn handle(&self) -> &str {
        self.field.handle()
    }

    /// The field accessor.
    pub fn field(&self) -> &UploadField<'a> {
        &self.field
    }

    /// The registered constraints.
    pub fn constraints(&self) -> &UploadConstraints {
        &self.constraints
    }

    /// Whether a file was submitted.
    pub fn has_upload(&self) -> bool {
        self.field.has_upload()
    }

    /// Whether the field was submitted in the multi-file shape.
    pub fn is_multiple(&self) -> bool {
        self.field.is_multiple()
    }

    /// Per-file records of the field.
    pub fn file_data(&self) -> FileData {
        self.field.file_data()
    }

    /// Run every check, stopping at the first failure.
    pub fn is_valid(&self) -> ValidationOutcome {
        self.validate().into()
    }

    /// Run every check, stopping at the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let handle = self.handle();

        if !self.field.has_upload() {
            debug!(handle = %handle, "No upload for field");
            return Err(ValidationError::NoUpload);
        }

        for (index, code) in self.field.error_codes().iter().enumerate() {
            if !code.is_ok() {
                debug!(handle = %handle, index, code = %code, "Platform upload error");
                return Err(ValidationError::Platform(*code));
            }
        }

        let rules = self.rules();
        if rules.is_empty() {
            return Ok(());
        }

        let files = self.field.file_data().into_vec();
        let detected: Vec<Option<String>> = if rules.iter().any(|rule| rule.needs_mime()) {
            files.iter().map(|file| self.resolver.resolve(&file.path)).collect()
        } else {
            vec![None; files.len()]
        };

        for rule in &rules {
            for (index, (file, mime)) in files.iter().zip(&detected).enumerate() {
                if let Err(e) = rule.validate(file, mime.as_deref()) {
                    debug!(
                        handle = %handle,
                        index,
                        rule = rule.description(),
                        reason = %e,
                        "Upload rejected"
                    );
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn rules(&self) -> Vec<Box<dyn ValidationRule + '_>> {
        let mut rules: Vec<Box<dyn ValidationRule + '_>> = Vec::new();

        if !self.constraints.mime_types.is_empty() {
            rules.push(Box::new(AllowedMimeTypesRule(&self.constraints.mime_types)));
        }
        if !self.constraints.type_categories.is_empty() {
            rules.push(Box::new(AllowedCategoriesRule(
                &self.constraints.type_categories,
            )));
        }
        if !self.constraints.extensions.is_empty() {
            rules.push(Box::new(AllowedExtensionsRule(&self.constraints.extensions)));
        }

        rules
    }
}
