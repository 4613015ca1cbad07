//! Upload field validation for Armature
//!
//! This module provides:
//! - A typed accessor over single- and multi-file upload fields
//! - Validation against allowed extensions, type categories and MIME types
//! - Platform upload error codes mapped to uploader-facing reasons
//! - Transposition of multi-file fields into per-file records
//! - Collection of multipart uploads into temporary files
//!
//! # Features
//!
//! - **Shape-aware access** - `photo` and `photos[]` fields read the same way
//! - **Fail-fast validation** - the first failing check is the one reported
//! - **Content sniffing** - MIME types come from file content, not the client
//! - **Config files** - constraints load from JSON or TOML
//!
//! # Quick Start
//!
//! ```
//! use armature_upload::*;
//! use serde_json::json;
//!
//! let files = UploadedFiles::from_value(json!({
//!     "photos": {
//!         "error": [0, 3],
//!         "name": ["a.jpg", "b.jpg"],
//!         "path": ["/tmp/upload-a", "/tmp/upload-b"],
//!         "size": [1024, 0],
//!         "type": ["image/jpeg", "image/jpeg"]
//!     }
//! }));
//!
//! let validator = UploadValidator::new(&files, "photos")
//!     .add_allowed_file_extension(["jpg", "jpeg", "png"]);
//!
//! assert!(validator.is_multiple());
//! assert_eq!(validator.file_data().len(), 2);
//! assert_eq!(
//!     validator.is_valid().reason().as_deref(),
//!     Some("uploaded file was only partially uploaded. please try again.")
//! );
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod multipart;
pub mod record;
pub mod resolver;
pub mod validation;

pub use config::*;
pub use error::*;
pub use field::*;
pub use multipart::*;
pub use record::*;
pub use resolver::*;
pub use validation::*;
