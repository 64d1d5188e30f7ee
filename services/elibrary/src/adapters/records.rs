//! services/elibrary/src/adapters/records.rs
//!
//! Serializable mirrors of the core domain types. The same JSON shape is used
//! on the wire and in local storage, so a record fetched from the backend can
//! be written to the fallback store unchanged.

use chrono::{DateTime, Utc};
use elibrary_core::domain::{AuthGrant, Document, LastUpload, Note, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub user_id: String,
}

impl DocumentRecord {
    pub fn to_domain(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            filename: self.filename,
            upload_date: self.upload_date,
            owner_id: self.user_id,
        }
    }

    pub fn from_domain(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            filename: doc.filename.clone(),
            upload_date: doc.upload_date,
            user_id: doc.owner_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pdf_id: String,
    #[serde(default)]
    pub user_id: String,
}

impl NoteRecord {
    pub fn to_domain(self) -> Note {
        Note {
            id: self.id,
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
            document_id: self.pdf_id,
            owner_id: self.user_id,
        }
    }

    pub fn from_domain(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            content: note.content.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
            pdf_id: note.document_id.clone(),
            user_id: note.owner_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl UserRecord {
    pub fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
        }
    }

    pub fn from_domain(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Body of a successful `/auth/login` or `/auth/register` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    pub user: UserRecord,
}

impl AuthRecord {
    pub fn to_domain(self) -> AuthGrant {
        AuthGrant {
            token: self.token,
            user: self.user.to_domain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUploadRecord {
    pub name: String,
    pub size: usize,
    pub document_id: String,
    pub uploaded_at: DateTime<Utc>,
}

impl LastUploadRecord {
    pub fn to_domain(self) -> LastUpload {
        LastUpload {
            name: self.name,
            size: self.size,
            document_id: self.document_id,
            uploaded_at: self.uploaded_at,
        }
    }

    pub fn from_domain(upload: &LastUpload) -> Self {
        Self {
            name: upload.name.clone(),
            size: upload.size,
            document_id: upload.document_id.clone(),
            uploaded_at: upload.uploaded_at,
        }
    }
}
