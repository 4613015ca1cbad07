//! Multipart form data parsing.

use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{FileRecord, Result, UploadError, UploadErrorCode, UploadedFiles};

/// Re-export multer's Field type.
pub type MultipartField<'a> = multer::Field<'a>;

/// Multipart form data parser.
///
/// ## Example
///
/// ```rust,ignore
/// use armature_upload::{Multipart, MultipartConstraints, UploadValidator};
///
/// async fn handle_upload(multipart: Multipart) -> Result<(), Error> {
///     let files = multipart
///         .collect_uploads("/tmp/uploads", &MultipartConstraints::default())
///         .await?;
///
///     UploadValidator::new(&files, "avatar")
///         .images_only()
///         .validate()?;
///
///     Ok(())
/// }
/// ```
pub struct Multipart {
    inner: multer::Multipart<'static>,
}

impl Multipart {
    /// Create a new multipart parser from a stream and boundary.
    pub fn new<S>(stream: S, boundary: &str) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self {
            inner: multer::Multipart::new(stream, boundary),
        }
    }

    /// Create from HTTP headers and body.
    pub fn from_request<S>(content_type: &str, body: S) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static,
    {
        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| UploadError::Multipart(e.to_string()))?;

        Ok(Self::new(body, &boundary))
    }

    /// Get the next field from the multipart stream.
    pub async fn next_field(&mut self) -> Result<Option<MultipartField<'static>>> {
        self.inner.next_field().await.map_err(UploadError::from)
    }

    /// Receive every file field into `temp_dir` and describe the result.
    ///
    /// Field names ending in `[]` are multi-file handles (the suffix is
    /// dropped). A plain handle that appears more than once is promoted to
    /// the multi-file shape. Non-file fields are skipped.
    ///
    /// Transfer failures are recorded per file as platform error codes
    /// rather than returned; a broken stream ends collection after the
    /// interrupted file.
    pub async fn collect_uploads(
        mut self,
        temp_dir: impl AsRef<Path>,
        constraints: &MultipartConstraints,
    ) -> Result<UploadedFiles> {
        let temp_dir = temp_dir.as_ref();
        let mut files = UploadedFiles::new();
        let mut received = Received::default();
        let mut file_count = 0usize;

        while let Some(mut field) = self.next_field().await? {
            let Some(file_name) = field.file_name().map(String::from) else {
                continue;
            };
            let Some(field_name) = field.name().map(String::from) else {
                continue;
            };

            file_count += 1;
            if let Some(limit) = constraints.max_files {
                if file_count > limit {
                    return Err(UploadError::TooManyFiles { limit });
                }
            }

            let (handle, multiple) = match field_name.strip_suffix("[]") {
                Some(handle) => (handle.to_string(), true),
                None => (field_name.clone(), false),
            };

            let record = if file_name.is_empty() {
                FileRecord::new(file_name).with_error(UploadErrorCode::NoFile)
            } else {
                let mime_type = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_default();
                let (path, size, error) =
                    receive_file(&mut field, temp_dir, constraints, &mut received).await;

                FileRecord::new(file_name)
                    .with_error(error)
                    .with_path(path)
                    .with_size(size)
                    .with_mime_type(mime_type)
            };

            debug!(
                handle = %handle,
                name = %record.name,
                size = record.size,
                code = %record.error,
                "Received upload"
            );
            files.push(&handle, record, multiple);

            if received.interrupted {
                break;
            }
        }

        Ok(files)
    }
}

#[derive(Debug, Default)]
struct Received {
    total: u64,
    interrupted: bool,
}

async fn receive_file(
    field: &mut MultipartField<'static>,
    temp_dir: &Path,
    constraints: &MultipartConstraints,
    received: &mut Received,
) -> (PathBuf, u64, UploadErrorCode) {
    let dir_ok = fs::metadata(temp_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !dir_ok {
        warn!(dir = %temp_dir.display(), "Upload temporary directory is missing");
        return (PathBuf::new(), 0, UploadErrorCode::NoTmpDir);
    }

    let path = temp_dir.join(format!("upload-{}", Uuid::new_v4().simple()));
    let mut file = match fs::File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to create upload file");
            return (PathBuf::new(), 0, UploadErrorCode::CantWrite);
        }
    };

    let mut size = 0u64;
    let mut error = UploadErrorCode::Ok;

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                let len = chunk.len() as u64;
                size += len;
                received.total += len;

                if constraints.max_field_size.is_some_and(|max| size > max) {
                    error = UploadErrorCode::IniSize;
                    break;
                }
                if constraints.max_total_size.is_some_and(|max| received.total > max) {
                    error = UploadErrorCode::FormSize;
                    break;
                }
                if let Err(e) = file.write_all(&chunk).await {
                    warn!(path = %path.display(), error = %e, "Failed to write upload chunk");
                    error = UploadErrorCode::CantWrite;
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Upload stream interrupted");
                error = UploadErrorCode::Partial;
                received.interrupted = true;
                break;
            }
        }
    }

    if error.is_ok() {
        if let Err(e) = file.flush().await {
            warn!(path = %path.display(), error = %e, "Failed to flush upload file");
            error = UploadErrorCode::CantWrite;
        }
    }

    if error.is_ok() {
        return (path, size, error);
    }

    drop(file);
    if let Err(e) = fs::remove_file(&path).await {
        debug!(path = %path.display(), error = %e, "Failed to remove rejected upload");
    }
    (PathBuf::new(), 0, error)
}

/// Constraints for multipart parsing.
#[derive(Debug, Clone)]
pub struct MultipartConstraints {
    /// Maximum total size of all files.
    pub max_total_size: Option<u64>,
    /// Maximum size of a single file.
    pub max_field_size: Option<u64>,
    /// Maximum number of file fields.
    pub max_files: Option<usize>,
}

impl Default for MultipartConstraints {
    fn default() -> Self {
        Self {
            max_total_size: Some(100 * 1024 * 1024), // 100 MB
            max_field_size: Some(50 * 1024 * 1024),  // 50 MB
            max_files: Some(10),
        }
    }
}

impl MultipartConstraints {
    /// Create new constraints with no limits.
    pub fn unlimited() -> Self {
        Self {
            max_total_size: None,
            max_field_size: None,
            max_files: None,
        }
    }

    /// Set maximum total size.
    pub fn max_total_size(mut self, size: u64) -> Self {
        self.max_total_size = Some(size);
        self
    }

    /// Set maximum field size.
    pub fn max_field_size(mut self, size: u64) -> Self {
        self.max_field_size = Some(size);
        self
    }

    /// Set maximum number of files.
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }
}

/// Helper to create a Multipart from an HTTP request body.
pub fn parse_multipart<S>(content_type: &http::HeaderValue, body: S) -> Result<Multipart>
where
    S: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static,
{
    let content_type = content_type
        .to_str()
        .map_err(|_| UploadError::Multipart("Invalid content-type header".to_string()))?;

    Multipart::from_request(content_type, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const BOUNDARY: &str = "X-ARMATURE-BOUNDARY";

    fn part(name: &str, file_name: &str, content_type: &str, body: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n{body}\r\n"
        )
    }

    fn multipart(parts: &[String]) -> Multipart {
        let body = format!("{}--{BOUNDARY}--\r\n", parts.concat());
        let stream = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);
        Multipart::new(stream, BOUNDARY)
    }

    #[tokio::test]
    async fn test_single_file_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let files = multipart(&[part("avatar", "me.png", "image/png", "pngdata")])
            .collect_uploads(dir.path(), &MultipartConstraints::default())
            .await
            .unwrap();

        let field = files.field("avatar");
        assert!(field.has_upload());
        assert!(!field.is_multiple());

        let record = field.file_data().into_vec().remove(0);
        assert_eq!(record.name, "me.png");
        assert_eq!(record.size, 7);
        assert_eq!(record.mime_type, "image/png");
        assert!(record.path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&record.path).unwrap(), b"pngdata");
    }

    #[tokio::test]
    async fn test_bracket_handle_is_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let files = multipart(&[
            part("photos[]", "a.jpg", "image/jpeg", "aaa"),
            part("photos[]", "b.jpg", "image/jpeg", "bbbb"),
        ])
        .collect_uploads(dir.path(), &MultipartConstraints::default())
        .await
        .unwrap();

        let field = files.field("photos");
        assert!(field.is_multiple());
        assert_eq!(field.size().into_vec(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_field_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let files = multipart(&[part("doc", "big.txt", "text/plain", "0123456789")])
            .collect_uploads(dir.path(), &MultipartConstraints::unlimited().max_field_size(4))
            .await
            .unwrap();

        let record = files.field("doc").file_data().into_vec().remove(0);
        assert_eq!(record.error, UploadErrorCode::IniSize);
        assert_eq!(record.size, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let files = multipart(&[part("doc", "a.txt", "text/plain", "hi")])
            .collect_uploads(&missing, &MultipartConstraints::default())
            .await
            .unwrap();

        assert_eq!(
            files.field("doc").error().into_vec(),
            vec![UploadErrorCode::NoTmpDir]
        );
    }

    #[tokio::test]
    async fn test_too_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = multipart(&[
            part("a", "1.txt", "text/plain", "1"),
            part("b", "2.txt", "text/plain", "2"),
        ])
        .collect_uploads(dir.path(), &MultipartConstraints::unlimited().max_files(1))
        .await;

        assert!(matches!(result, Err(UploadError::TooManyFiles { limit: 1 })));
    }

    #[test]
    fn test_parse_multipart_requires_boundary() {
        let header = http::HeaderValue::from_static("multipart/form-data");
        let body = stream::iter(Vec::<std::result::Result<Bytes, std::io::Error>>::new());
        assert!(parse_multipart(&header, body).is_err());
    }
}
