//! Integration tests for armature-upload

use armature_upload::*;
use bytes::Bytes;
use futures::stream;
use serde_json::json;
use std::path::Path;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
const PDF: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

fn avatar(mime_type: &str) -> UploadedFiles {
    UploadedFiles::from_value(json!({
        "avatar": {
            "error": 0,
            "name": "me.png",
            "path": "/tmp/upload-avatar",
            "size": 2048,
            "type": mime_type
        }
    }))
}

fn avatar_validator<'a>(files: &'a UploadedFiles, detected: &'static str) -> UploadValidator<'a> {
    UploadValidator::new(files, "avatar")
        .add_allowed_file_type(["image"])
        .add_allowed_mime_type(["image/jpeg", "image/png"])
        .add_allowed_file_extension(["jpg", "jpeg", "png"])
        .with_resolver(move |_: &Path| Some(detected.to_string()))
}

#[test]
fn test_avatar_png_is_valid() {
    let files = avatar("image/png");
    assert_eq!(avatar_validator(&files, "image/png").is_valid(), ValidationOutcome::Valid);
}

#[test]
fn test_avatar_pdf_is_invalid_type() {
    let files = avatar("image/png");
    let outcome = avatar_validator(&files, "application/pdf").is_valid();
    assert_eq!(outcome.reason().as_deref(), Some("invalid file type."));
}

#[test]
fn test_extension_round_trip() {
    for (name, ok) in [("photo.JPG", true), ("photo.gif", false)] {
        let files = UploadedFiles::from_value(json!({
            "photo": { "error": 0, "name": name, "path": "/tmp/p", "size": 1, "type": "" }
        }));
        let result = UploadValidator::new(&files, "photo")
            .add_allowed_file_extension(["jpg"])
            .add_allowed_file_extension(["png"])
            .validate();

        if ok {
            assert!(result.is_ok(), "{} should pass", name);
        } else {
            assert!(matches!(result, Err(ValidationError::InvalidExtension { .. })));
        }
    }
}

#[test]
fn test_second_file_partial_upload() {
    let files = UploadedFiles::from_value(json!({
        "docs": {
            "error": [0, 3],
            "name": ["a.pdf", "b.pdf"],
            "path": ["/tmp/a", "/tmp/b"],
            "size": [100, 50],
            "type": ["application/pdf", "application/pdf"]
        }
    }));

    let outcome = UploadValidator::new(&files, "docs").is_valid();
    assert_eq!(
        outcome.reason().as_deref(),
        Some("uploaded file was only partially uploaded. please try again.")
    );
}

#[test]
fn test_later_file_fails_first_check_in_order() {
    let files = UploadedFiles::from_value(json!({
        "photos": {
            "error": [0, 0, 0],
            "name": ["a.png", "b.png", "c.exe"],
            "path": ["/tmp/a", "/tmp/b", "/tmp/c"]
        }
    }));

    // The third file has a bad extension, the second a bad type: type wins.
    let outcome = UploadValidator::new(&files, "photos")
        .add_allowed_mime_type(["image/png"])
        .add_allowed_file_extension(["png"])
        .with_resolver(|path: &Path| {
            if path == Path::new("/tmp/b") {
                Some("text/plain".to_string())
            } else {
                Some("image/png".to_string())
            }
        })
        .is_valid();

    assert_eq!(
        outcome,
        ValidationOutcome::Invalid(ValidationError::InvalidType {
            detected: Some("text/plain".to_string())
        })
    );
}

#[test]
fn test_file_data_shapes() {
    let files = UploadedFiles::from_value(json!({
        "single": {
            "error": 0, "name": "a.txt", "path": "/tmp/a", "size": "12", "type": "text/plain"
        },
        "many": {
            "error": [0, 0],
            "name": ["x.txt", "y.txt"],
            "path": ["/tmp/x", "/tmp/y"],
            "size": [1, 2],
            "type": ["text/plain", "text/csv"]
        }
    }));

    match UploadValidator::new(&files, "single").file_data() {
        FileData::Single(record) => assert_eq!(record.size, 12),
        other => panic!("expected a single record, got {:?}", other),
    }

    let many = UploadValidator::new(&files, "many").file_data();
    assert!(many.is_multiple());
    let types: Vec<_> = many.iter().map(|r| r.mime_type.as_str()).collect();
    assert_eq!(types, vec!["text/plain", "text/csv"]);
}

#[test]
fn test_sniffed_content_decides_type() {
    let dir = tempfile::tempdir().unwrap();
    let png_path = dir.path().join("upload-png");
    let pdf_path = dir.path().join("upload-pdf");
    std::fs::write(&png_path, PNG).unwrap();
    std::fs::write(&pdf_path, PDF).unwrap();

    let files = UploadedFiles::from_value(json!({
        "good": {
            "error": 0, "name": "a.png", "path": png_path, "size": PNG.len(), "type": "image/png"
        },
        "disguised": {
            "error": 0, "name": "b.png", "path": pdf_path, "size": PDF.len(), "type": "image/png"
        }
    }));

    assert!(UploadValidator::new(&files, "good").images_only().is_valid().is_valid());
    assert_eq!(
        UploadValidator::new(&files, "disguised").images_only().validate(),
        Err(ValidationError::InvalidType {
            detected: Some("application/pdf".to_string())
        })
    );
}

#[test]
fn test_plain_text_passes_document_rules() {
    let dir = tempfile::tempdir().unwrap();
    let notes_path = dir.path().join("upload-notes");
    let blob_path = dir.path().join("upload-blob");
    let notes: &[u8] = b"hello, plain text notes\n";
    let blob: &[u8] = &[0x01, 0x00, 0x02, 0x00];
    std::fs::write(&notes_path, notes).unwrap();
    std::fs::write(&blob_path, blob).unwrap();

    let files = UploadedFiles::from_value(json!({
        "notes": {
            "error": 0, "name": "notes.txt", "path": notes_path, "size": notes.len(), "type": ""
        },
        "blob": {
            "error": 0, "name": "blob.txt", "path": blob_path, "size": blob.len(), "type": ""
        }
    }));

    assert_eq!(UploadValidator::new(&files, "notes").documents_only().validate(), Ok(()));
    assert_eq!(
        UploadValidator::new(&files, "notes").add_allowed_file_type(["text"]).validate(),
        Ok(())
    );
    assert_eq!(
        UploadValidator::new(&files, "blob").documents_only().validate(),
        Err(ValidationError::InvalidType { detected: None })
    );
}

#[test]
fn test_constraints_from_config() {
    let constraints = UploadConstraints::from_toml_str(
        r#"
        extensions = ["pdf"]
        mime_types = ["application/pdf"]
        "#,
    )
    .unwrap();

    let files = UploadedFiles::from_value(json!({
        "doc": { "error": 0, "name": "report.PDF", "path": "/tmp/r", "size": 10, "type": "" }
    }));

    let validator = UploadValidator::new(&files, "doc")
        .with_constraints(constraints)
        .with_resolver(|_: &Path| Some("application/pdf".to_string()));
    assert!(validator.validate().is_ok());
}

#[tokio::test]
async fn test_multipart_to_validation() {
    let dir = tempfile::tempdir().unwrap();
    let boundary = "armature-test-boundary";

    let mut body = Vec::new();
    for (name, data) in [("a.png", PNG), ("b.png", PNG)] {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"gallery[]\"; filename=\"{name}\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Holiday\r\n--{boundary}--\r\n"
        )
        .as_bytes(),
    );

    let stream = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);
    let content_type =
        http::HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")).unwrap();

    let files = parse_multipart(&content_type, stream)
        .unwrap()
        .collect_uploads(dir.path(), &MultipartConstraints::default())
        .await
        .unwrap();

    assert!(!files.contains("title"));

    let validator = UploadValidator::new(&files, "gallery")
        .images_only()
        .add_allowed_mime_type(["image/png"])
        .add_allowed_file_extension(["png"]);

    assert!(validator.is_multiple());
    assert_eq!(validator.file_data().len(), 2);
    assert_eq!(validator.is_valid(), ValidationOutcome::Valid);
}
