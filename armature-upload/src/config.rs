// Constraint configuration and loaders

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::{Result, UploadError};

/// Supported constraint file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintFormat {
    Json,
    Toml,
}

impl ConstraintFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ConstraintFormat::Json),
            "toml" => Some(ConstraintFormat::Toml),
            _ => None,
        }
    }
}

/// Allow-lists applied to an upload field.
///
/// An empty set places no restriction on its dimension. Values are stored
/// lower-cased; extensions are stored without a leading dot.
///
/// ```toml
/// extensions = ["jpg", "jpeg", "png"]
/// type_categories = ["image"]
/// mime_types = ["image/jpeg", "image/png"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConstraints {
    /// Allowed file extensions.
    #[serde(deserialize_with = "extension_set")]
    pub extensions: HashSet<String>,
    /// Allowed type categories (first MIME segment).
    #[serde(deserialize_with = "lowercase_set")]
    pub type_categories: HashSet<String>,
    /// Allowed full MIME types.
    #[serde(deserialize_with = "lowercase_set")]
    pub mime_types: HashSet<String>,
}

impl UploadConstraints {
    /// Create an unrestricted constraint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse constraints from JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| UploadError::Config(format!("JSON parse error: {}", e)))
    }

    /// Parse constraints from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| UploadError::Config(format!("TOML parse error: {}", e)))
    }

    /// Load constraints from a file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| UploadError::Config("No file extension found".to_string()))?;

        let format = ConstraintFormat::from_extension(ext)
            .ok_or_else(|| UploadError::Config(format!("Unsupported format: {}", ext)))?;

        let content = fs::read_to_string(path)
            .map_err(|e| UploadError::Config(format!("Failed to read file: {}", e)))?;

        match format {
            ConstraintFormat::Json => Self::from_json_str(&content),
            ConstraintFormat::Toml => Self::from_toml_str(&content),
        }
    }

    /// Allow file extensions.
    pub fn add_extensions<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions
            .extend(extensions.into_iter().map(|e| normalize_extension(e.as_ref())));
    }

    /// Allow type categories.
    pub fn add_type_categories<I, S>(&mut self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.type_categories
            .extend(categories.into_iter().map(|c| normalize(c.as_ref())));
    }

    /// Allow MIME types.
    pub fn add_mime_types<I, S>(&mut self, mime_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mime_types
            .extend(mime_types.into_iter().map(|m| normalize(m.as_ref())));
    }

    /// Add every value of `other`.
    pub fn merge(&mut self, other: UploadConstraints) {
        self.add_extensions(other.extensions);
        self.add_type_categories(other.type_categories);
        self.add_mime_types(other.mime_types);
    }

    /// Whether no dimension is restricted.
    pub fn is_unrestricted(&self) -> bool {
        self.extensions.is_empty() && self.type_categories.is_empty() && self.mime_types.is_empty()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn normalize_extension(value: &str) -> String {
    normalize(value).trim_start_matches('.').to_string()
}

fn lowercase_set<'de, D>(deserializer: D) -> std::result::Result<HashSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<String>::deserialize(deserializer)?;
    Ok(values.iter().map(|v| normalize(v)).collect())
}

fn extension_set<'de, D>(deserializer: D) -> std::result::Result<HashSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<String>::deserialize(deserializer)?;
    Ok(values.iter().map(|v| normalize_extension(v)).collect())
}
