//! MIME type resolution for received files.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Resolves the MIME type of a file that has already been received.
///
/// `None` means the type could not be determined; validation treats it as a
/// type that matches nothing.
pub trait MimeResolver: Send + Sync {
    /// Resolve the MIME type of the file at `path`.
    fn resolve(&self, path: &Path) -> Option<String>;
}

impl<F> MimeResolver for F
where
    F: Fn(&Path) -> Option<String> + Send + Sync,
{
    fn resolve(&self, path: &Path) -> Option<String> {
        self(path)
    }
}

/// Number of leading bytes inspected per file.
const SNIFF_LEN: u64 = 8192;

/// Detects the type from the file's leading bytes.
///
/// Content without a known signature is reported as `text/plain` when it is
/// non-empty UTF-8 without NUL bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSniffer;

impl ContentSniffer {
    fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
        let mut head = Vec::new();
        File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
        Ok(head)
    }
}

impl MimeResolver for ContentSniffer {
    fn resolve(&self, path: &Path) -> Option<String> {
        let head = match Self::read_head(path) {
            Ok(head) => head,
            Err(e) => {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read file for type detection"
                );
                return None;
            }
        };

        if let Some(kind) = infer::get(&head) {
            return Some(kind.mime_type().to_string());
        }
        if is_plain_text(&head) {
            return Some(mime::TEXT_PLAIN.essence_str().to_string());
        }

        debug!(path = %path.display(), "No known signature in file content");
        None
    }
}

/// Non-empty UTF-8 without NUL bytes. A multi-byte character cut off at the
/// end of the inspected head still counts as text.
fn is_plain_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Guesses the type from the path's extension.
///
/// Only meaningful when the stored file keeps its original extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionGuesser;

impl MimeResolver for ExtensionGuesser {
    fn resolve(&self, path: &Path) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

/// Lower-cased type category of a MIME string: the part before the first `/`.
pub fn type_category(mime_type: &str) -> String {
    mime_type
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}
