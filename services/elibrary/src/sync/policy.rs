//! services/elibrary/src/sync/policy.rs
//!
//! The synchronization policy. Every operation is attempted against the
//! backend first. Reads that succeed are returned untouched; mutations that
//! succeed are also written through to the local mirror. When the backend is
//! unreachable (or answers with anything but 2xx/401) the same logical
//! operation is applied to the local fallback store, queued in the outbox for
//! later replay, and reported as `PersistedLocal`.
//!
//! A 401 is never swallowed: the HTTP layer has already evicted the session
//! and the error goes back to the caller.

use crate::adapters::fallback::LocalFallbackStore;
use crate::adapters::seed::DEMO_OWNER;
use crate::session::Session;
use crate::sync::outbox::{Mutation, Outbox, PendingFile, PendingMutation};
use chrono::Utc;
use elibrary_core::domain::{AuthGrant, Document, LastUpload, Note, UploadFile, User};
use elibrary_core::ports::{LibraryService, PortError, PortResult};
use elibrary_core::validation::{normalize_note_content, require, validate_upload};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Where a record currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// A write for the record is in flight.
    Pending,
    /// The backend has the record.
    Persisted,
    /// Only the local store has the latest version; a replay is queued.
    PersistedLocal,
}

/// A result together with the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced<T> {
    pub value: T,
    pub state: SyncState,
}

impl<T> Synced<T> {
    fn remote(value: T) -> Self {
        Self {
            value,
            state: SyncState::Persisted,
        }
    }

    fn local(value: T) -> Self {
        Self {
            value,
            state: SyncState::PersistedLocal,
        }
    }

    pub fn is_local(&self) -> bool {
        self.state == SyncState::PersistedLocal
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Synced<U> {
        Synced {
            value: f(self.value),
            state: self.state,
        }
    }
}

/// Marks a record as in flight for as long as it is alive.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn start(set: &'a Mutex<HashSet<String>>, id: &str) -> Self {
        set.lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
        Self {
            set,
            id: id.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

//=========================================================================================
// The Synchronized Library
//=========================================================================================

pub struct SyncedLibrary {
    remote: Arc<dyn LibraryService>,
    local: Arc<LocalFallbackStore>,
    outbox: Arc<Outbox>,
    session: Arc<Session>,
    demo_auth: bool,
    in_flight: Mutex<HashSet<String>>,
}

impl SyncedLibrary {
    pub fn new(
        remote: Arc<dyn LibraryService>,
        local: Arc<LocalFallbackStore>,
        outbox: Arc<Outbox>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            remote,
            local,
            outbox,
            session,
            demo_auth: false,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Accept any credentials with a demo session when the backend cannot be reached.
    pub fn with_demo_auth(mut self, enabled: bool) -> Self {
        self.demo_auth = enabled;
        self
    }

    fn owner_id(&self) -> String {
        self.session
            .user()
            .map(|u| u.id)
            .unwrap_or_else(|| DEMO_OWNER.to_string())
    }

    /// Logs a failed local write-through. The remote write already succeeded.
    fn write_through(&self, what: &str, result: PortResult<impl Sized>) {
        if let Err(e) = result {
            warn!("Failed to mirror {} locally: {:?}", what, e);
        }
    }

    /// Logs the outcome of discarding queued changes the backend has overtaken.
    fn settle_queue(&self, id: &str, result: PortResult<usize>) {
        match result {
            Ok(0) => {}
            Ok(n) => info!("Discarded {} queued change(s) to {} overtaken by the backend", n, id),
            Err(e) => warn!("Failed to discard queued changes to {}: {:?}", id, e),
        }
    }

    fn queue(&self, mutation: Mutation) -> PortResult<()> {
        self.outbox.enqueue(mutation)
    }

    // --- Auth ---

    pub async fn login(&self, email: &str, password: &str) -> PortResult<AuthGrant> {
        require("email", email)?;
        require("password", password)?;

        let grant = match self.remote.login(email, password).await {
            Ok(grant) => grant,
            Err(PortError::Network(reason)) if self.demo_auth => {
                warn!("Backend unreachable ({}), signing in with a demo session", reason);
                let username = email.split('@').next().filter(|s| !s.is_empty()).unwrap_or("Demo User");
                demo_grant("demo-user-1".to_string(), username, email)
            }
            Err(e) => return Err(e),
        };
        self.session.sign_in(&grant)?;
        Ok(grant)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> PortResult<AuthGrant> {
        require("username", username)?;
        require("email", email)?;
        require("password", password)?;

        let grant = match self.remote.register(username, email, password).await {
            Ok(grant) => grant,
            Err(PortError::Network(reason)) if self.demo_auth => {
                warn!("Backend unreachable ({}), registering a demo session", reason);
                let id = format!("demo-user-{}", Utc::now().timestamp_millis());
                demo_grant(id, username, email)
            }
            Err(e) => return Err(e),
        };
        self.session.sign_in(&grant)?;
        Ok(grant)
    }

    pub fn logout(&self) -> PortResult<()> {
        self.session.sign_out()
    }

    // --- Documents ---

    pub async fn list_documents(&self) -> PortResult<Synced<Vec<Document>>> {
        match self.remote.list_documents().await {
            Ok(docs) => Ok(Synced::remote(docs)),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Listing documents from the local store: {}", e);
                Ok(Synced::local(self.local.documents()?))
            }
            Err(e) => Err(e),
        }
    }

    /// Documents whose title or file name contains `query`, ignoring case.
    pub async fn search_documents(&self, query: &str) -> PortResult<Synced<Vec<Document>>> {
        Ok(self
            .list_documents()
            .await?
            .map(|docs| docs.into_iter().filter(|d| d.matches(query)).collect()))
    }

    pub async fn get_document(&self, id: &str) -> PortResult<Synced<Document>> {
        match self.remote.get_document(id).await {
            Ok(doc) => Ok(Synced::remote(doc)),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Loading document {} from the local store: {}", id, e);
                self.local
                    .document(id)?
                    .or_else(|| self.local.placeholder_document(id))
                    .map(Synced::local)
                    .ok_or_else(|| PortError::NotFound(format!("Document {} not found", id)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn upload_document(&self, file: UploadFile) -> PortResult<Synced<Document>> {
        validate_upload(&file)?;

        let synced = match self.remote.upload_document(&file).await {
            Ok(doc) => {
                self.write_through("uploaded document", self.local.mirror_document(&doc));
                Synced::remote(doc)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Upload of {} kept locally: {}", file.name, e);
                let doc = Document {
                    id: self.local.new_id(),
                    title: file.title(),
                    filename: file.name.clone(),
                    upload_date: Utc::now(),
                    owner_id: self.owner_id(),
                };
                self.local.add_document(&doc)?;
                self.queue(Mutation::UploadDocument {
                    local_id: doc.id.clone(),
                    file: PendingFile::from_upload(&file),
                })?;
                Synced::local(doc)
            }
            Err(e) => return Err(e),
        };

        let last = LastUpload {
            name: file.name.clone(),
            size: file.size(),
            document_id: synced.value.id.clone(),
            uploaded_at: Utc::now(),
        };
        self.write_through("last upload", self.local.stash_last_upload(&last));
        info!("Uploaded {} as document {}", file.name, synced.value.id);
        Ok(synced)
    }

    /// The most recent upload, handed out once.
    pub fn take_last_upload(&self) -> PortResult<Option<LastUpload>> {
        self.local.take_last_upload()
    }

    /// Deletes the document. Its notes are kept as orphans.
    pub async fn delete_document(&self, id: &str) -> PortResult<Synced<()>> {
        let _in_flight = InFlight::start(&self.in_flight, id);
        match self.remote.delete_document(id).await {
            Ok(()) => {
                self.settle_queue(id, self.outbox.forget(id));
                self.write_through("document deletion", self.local.remove_document(id));
                Ok(Synced::remote(()))
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Deleting document {} locally: {}", id, e);
                self.local.remove_document(id)?;
                self.queue(Mutation::DeleteDocument { id: id.to_string() })?;
                Ok(Synced::local(()))
            }
            Err(e) => Err(e),
        }
    }

    // --- Notes ---

    pub async fn list_notes(&self, document_id: &str) -> PortResult<Synced<Vec<Note>>> {
        match self.remote.list_notes(document_id).await {
            Ok(notes) => Ok(Synced::remote(notes)),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Listing notes of {} from the local store: {}", document_id, e);
                Ok(Synced::local(self.local.notes(document_id)?))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_note(&self, document_id: &str, content: &str) -> PortResult<Synced<Note>> {
        let content = normalize_note_content(content)?;

        match self.remote.create_note(document_id, &content).await {
            Ok(note) => {
                self.write_through("created note", self.local.mirror_note(&note));
                Ok(Synced::remote(note))
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Note on {} kept locally: {}", document_id, e);
                let now = Utc::now();
                let note = Note {
                    id: self.local.new_id(),
                    content: content.clone(),
                    created_at: now,
                    updated_at: now,
                    document_id: document_id.to_string(),
                    owner_id: self.owner_id(),
                };
                self.local.add_note(&note)?;
                self.queue(Mutation::CreateNote {
                    local_id: note.id.clone(),
                    document_id: document_id.to_string(),
                    content,
                })?;
                Ok(Synced::local(note))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_note(&self, note_id: &str, content: &str) -> PortResult<Synced<Note>> {
        let content = normalize_note_content(content)?;
        let _in_flight = InFlight::start(&self.in_flight, note_id);

        match self.remote.update_note(note_id, &content).await {
            Ok(note) => {
                self.settle_queue(note_id, self.outbox.drop_updates(note_id));
                self.write_through("edited note", self.local.put_note(note_id, &note));
                Ok(Synced::remote(note))
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Edit of note {} kept locally: {}", note_id, e);
                let note = self.local.edit_note(note_id, &content, Utc::now())?;
                self.queue(Mutation::UpdateNote {
                    note_id: note_id.to_string(),
                    content,
                })?;
                Ok(Synced::local(note))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_note(&self, note_id: &str) -> PortResult<Synced<()>> {
        let _in_flight = InFlight::start(&self.in_flight, note_id);
        match self.remote.delete_note(note_id).await {
            Ok(()) => {
                self.settle_queue(note_id, self.outbox.forget(note_id));
                self.write_through("note deletion", self.local.remove_note(note_id));
                Ok(Synced::remote(()))
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Deleting note {} locally: {}", note_id, e);
                self.local.remove_note(note_id)?;
                self.queue(Mutation::DeleteNote {
                    note_id: note_id.to_string(),
                })?;
                Ok(Synced::local(()))
            }
            Err(e) => Err(e),
        }
    }

    // --- State ---

    /// Where the record with `id` currently stands. Only mutations that write
    /// the record itself count; a note queued on a document leaves the
    /// document `Persisted`.
    pub fn sync_state(&self, id: &str) -> PortResult<SyncState> {
        if self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
        {
            return Ok(SyncState::Pending);
        }
        if self.outbox.references(id)? {
            Ok(SyncState::PersistedLocal)
        } else {
            Ok(SyncState::Persisted)
        }
    }

    pub fn pending_mutations(&self) -> PortResult<Vec<PendingMutation>> {
        self.outbox.pending()
    }
}

fn demo_grant(user_id: String, username: &str, email: &str) -> AuthGrant {
    AuthGrant {
        token: format!("demo-jwt-token-{}", Utc::now().timestamp_millis()),
        user: User {
            id: user_id,
            username: username.to_string(),
            email: email.to_string(),
        },
    }
}
