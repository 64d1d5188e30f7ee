//! crates/elibrary_core/src/domain.rs
//!
//! Defines the pure, core data structures for the library client.
//! These structs are independent of any storage or wire format.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The MIME type every uploaded document must carry.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Represents a PDF document in a user's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    pub owner_id: String,
}

impl Document {
    /// Case-insensitive match of `query` against the title or the file name.
    /// An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query) || self.filename.to_lowercase().contains(&query)
    }
}

/// A note attached to a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_id: String,
    pub owner_id: String,
}

impl Note {
    /// True once the note has been edited after creation.
    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }
}

// Represents the signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// What a successful login or registration hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub token: String,
    pub user: User,
}

/// A file picked for upload. `bytes` is the full file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Title derived from the file name, the way the library shows fresh uploads.
    pub fn title(&self) -> String {
        let stem = self.name.replacen(".pdf", "", 1);
        if stem.trim().is_empty() {
            "Uploaded Document".to_string()
        } else {
            stem
        }
    }
}

/// The transient record of the most recent upload, consumed once by the library view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastUpload {
    pub name: String,
    pub size: usize,
    pub document_id: String,
    pub uploaded_at: DateTime<Utc>,
}
