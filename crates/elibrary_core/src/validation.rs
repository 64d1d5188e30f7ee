//! crates/elibrary_core/src/validation.rs
//!
//! Input checks that run before any network call is attempted.

use crate::domain::{UploadFile, PDF_MIME_TYPE};

/// Largest accepted upload, in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Rejections raised before a request is ever built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid file type '{mime}': please select a PDF file")]
    NotPdf { mime: String },
    #[error("File too large ({size} bytes): please select a file smaller than {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("The selected file has no name")]
    EmptyFileName,
    #[error("Note content cannot be empty")]
    EmptyNote,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Accepts only PDF files no larger than [`MAX_UPLOAD_BYTES`].
pub fn validate_upload(file: &UploadFile) -> Result<(), ValidationError> {
    if file.name.trim().is_empty() {
        return Err(ValidationError::EmptyFileName);
    }
    if file.mime_type != PDF_MIME_TYPE {
        return Err(ValidationError::NotPdf {
            mime: file.mime_type.clone(),
        });
    }
    if file.size() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            size: file.size(),
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Returns the trimmed note text, or an error if nothing is left.
pub fn normalize_note_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyNote);
    }
    Ok(trimmed.to_string())
}

pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}
