//! services/elibrary/src/adapters/remote.rs
//!
//! This module contains the REST adapter, the concrete implementation of the
//! `LibraryService` port from the `core` crate. It shapes requests and
//! responses for the auth, PDF and notes endpoints on top of `HttpClient`.

use crate::adapters::http::HttpClient;
use crate::adapters::records::{AuthRecord, DocumentRecord, NoteRecord};
use async_trait::async_trait;
use elibrary_core::domain::{AuthGrant, Document, Note, UploadFile};
use elibrary_core::ports::{LibraryService, PortError, PortResult};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A REST adapter that implements the `LibraryService` port.
#[derive(Clone)]
pub struct HttpLibrary {
    http: HttpClient,
}

impl HttpLibrary {
    /// Creates a new `HttpLibrary`.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct NoteRequest<'a> {
    content: &'a str,
}

//=========================================================================================
// `LibraryService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LibraryService for HttpLibrary {
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthGrant> {
        let record: AuthRecord = self
            .http
            .post_json(&["auth", "login"], &LoginRequest { email, password })
            .await?;
        Ok(record.to_domain())
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> PortResult<AuthGrant> {
        let record: AuthRecord = self
            .http
            .post_json(
                &["auth", "register"],
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let records: Vec<DocumentRecord> = self.http.get_json(&["pdf"]).await?;
        Ok(records.into_iter().map(DocumentRecord::to_domain).collect())
    }

    async fn get_document(&self, id: &str) -> PortResult<Document> {
        let record: DocumentRecord = self.http.get_json(&["pdf", id]).await?;
        Ok(record.to_domain())
    }

    async fn upload_document(&self, file: &UploadFile) -> PortResult<Document> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| PortError::Unexpected(format!("invalid MIME type: {}", e)))?;
        let form = Form::new().part("pdf", part);

        let record: DocumentRecord = self.http.post_multipart(&["pdf", "upload"], form).await?;
        Ok(record.to_domain())
    }

    async fn delete_document(&self, id: &str) -> PortResult<()> {
        self.http.delete(&["pdf", id]).await
    }

    async fn list_notes(&self, document_id: &str) -> PortResult<Vec<Note>> {
        let records: Vec<NoteRecord> = self.http.get_json(&["notes", document_id]).await?;
        Ok(records.into_iter().map(NoteRecord::to_domain).collect())
    }

    async fn create_note(&self, document_id: &str, content: &str) -> PortResult<Note> {
        let record: NoteRecord = self
            .http
            .post_json(&["notes", document_id], &NoteRequest { content })
            .await?;
        Ok(record.to_domain())
    }

    async fn update_note(&self, note_id: &str, content: &str) -> PortResult<Note> {
        let record: NoteRecord = self
            .http
            .put_json(&["notes", note_id], &NoteRequest { content })
            .await?;
        Ok(record.to_domain())
    }

    async fn delete_note(&self, note_id: &str) -> PortResult<()> {
        self.http.delete(&["notes", note_id]).await
    }
}
