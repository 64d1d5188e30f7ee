//! crates/elibrary_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the library client's core logic.
//! These traits form the boundary of the hexagonal architecture, so the
//! synchronization layer never depends on a concrete HTTP stack, storage
//! medium or demo dataset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AuthGrant, Document, Note, UploadFile};
use crate::validation::ValidationError;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// No response was received (connection refused, DNS, reset...).
    #[error("Network error: {0}")]
    Network(String),
    /// The remote answered with a non-2xx status other than 401.
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether the synchronization layer may redirect the operation to the
    /// local fallback store instead of surfacing this error.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            PortError::Network(_) => true,
            PortError::Remote { status, .. } => *status != 401,
            _ => false,
        }
    }

    /// The HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PortError::Remote { status, .. } => Some(*status),
            PortError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote E-Library backend.
#[async_trait]
pub trait LibraryService: Send + Sync {
    // --- Auth ---
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthGrant>;

    async fn register(&self, username: &str, email: &str, password: &str) -> PortResult<AuthGrant>;

    // --- Documents ---
    async fn list_documents(&self) -> PortResult<Vec<Document>>;

    async fn get_document(&self, id: &str) -> PortResult<Document>;

    async fn upload_document(&self, file: &UploadFile) -> PortResult<Document>;

    async fn delete_document(&self, id: &str) -> PortResult<()>;

    // --- Notes ---
    async fn list_notes(&self, document_id: &str) -> PortResult<Vec<Note>>;

    async fn create_note(&self, document_id: &str, content: &str) -> PortResult<Note>;

    async fn update_note(&self, note_id: &str, content: &str) -> PortResult<Note>;

    async fn delete_note(&self, note_id: &str) -> PortResult<()>;
}

/// Durable string key-value storage, the client-side equivalent of browser
/// local storage.
pub trait KeyValueStorage: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written or was removed.
    fn get(&self, key: &str) -> PortResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PortResult<()>;

    fn remove(&self, key: &str) -> PortResult<()>;

    /// All keys currently present, in no particular order.
    fn keys(&self) -> PortResult<Vec<String>>;
}

/// Supplies the records a local collection is seeded with the first time it is read.
pub trait SeedProvider: Send + Sync {
    /// Documents for an absent documents collection, newest first.
    fn documents(&self, now: DateTime<Utc>) -> Vec<Document>;

    /// Notes for an absent notes collection of `document_id`, newest first.
    fn notes(&self, document_id: &str, now: DateTime<Utc>) -> Vec<Note>;

    /// Stand-in shown when a document cannot be loaded from anywhere.
    fn placeholder_document(&self, id: &str, now: DateTime<Utc>) -> Option<Document>;
}
