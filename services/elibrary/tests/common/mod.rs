//! Shared fixtures: an in-memory backend whose availability can be switched
//! at runtime, and a helper that wires an `AppState` around it.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use elibrary_core::domain::{AuthGrant, Document, Note, UploadFile, User};
use elibrary_core::ports::{KeyValueStorage, LibraryService, PortError, PortResult};
use elibrary_lib::adapters::{MemoryStorage, TokenStore};
use elibrary_lib::config::Config;
use elibrary_lib::session::Session;
use elibrary_lib::state::AppState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How the fake backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    /// Every call fails as if the connection was refused.
    Offline,
    /// Every call is answered with this non-2xx status.
    Failing(u16),
}

#[derive(Default)]
struct Data {
    documents: Vec<Document>,
    notes: Vec<Note>,
    next_id: u64,
}

pub struct FakeLibrary {
    mode: Mutex<Mode>,
    data: Mutex<Data>,
    calls: AtomicUsize,
}

impl FakeLibrary {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            data: Mutex::new(Data::default()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> Vec<Document> {
        self.data.lock().unwrap().documents.clone()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.data.lock().unwrap().notes.clone()
    }

    pub fn insert_note(&self, document_id: &str, content: &str) -> Note {
        let mut data = self.data.lock().unwrap();
        let note = new_note(&mut data, document_id, content);
        data.notes.push(note.clone());
        note
    }

    /// Deletes a note behind the client's back, as another device would.
    pub fn remove_note(&self, note_id: &str) {
        self.data.lock().unwrap().notes.retain(|n| n.id != note_id);
    }

    fn check(&self) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.mode.lock().unwrap() {
            Mode::Online => Ok(()),
            Mode::Offline => Err(PortError::Network("connection refused".to_string())),
            Mode::Failing(401) => Err(PortError::Unauthorized),
            Mode::Failing(status) => Err(PortError::Remote {
                status,
                message: "backend rejected the request".to_string(),
            }),
        }
    }
}

fn next_id(data: &mut Data, prefix: &str) -> String {
    data.next_id += 1;
    format!("{}-{}", prefix, data.next_id)
}

fn new_note(data: &mut Data, document_id: &str, content: &str) -> Note {
    let now = Utc::now();
    Note {
        id: next_id(data, "srv-note"),
        content: content.to_string(),
        created_at: now,
        updated_at: now,
        document_id: document_id.to_string(),
        owner_id: "u-1".to_string(),
    }
}

fn not_found(what: &str) -> PortError {
    PortError::Remote {
        status: 404,
        message: format!("{} not found", what),
    }
}

#[async_trait]
impl LibraryService for FakeLibrary {
    async fn login(&self, email: &str, _password: &str) -> PortResult<AuthGrant> {
        self.check()?;
        Ok(AuthGrant {
            token: "jwt-remote".to_string(),
            user: User {
                id: "u-1".to_string(),
                username: "reader".to_string(),
                email: email.to_string(),
            },
        })
    }

    async fn register(&self, username: &str, email: &str, _password: &str) -> PortResult<AuthGrant> {
        self.check()?;
        Ok(AuthGrant {
            token: "jwt-new".to_string(),
            user: User {
                id: "u-2".to_string(),
                username: username.to_string(),
                email: email.to_string(),
            },
        })
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        self.check()?;
        Ok(self.documents())
    }

    async fn get_document(&self, id: &str) -> PortResult<Document> {
        self.check()?;
        self.documents()
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| not_found("document"))
    }

    async fn upload_document(&self, file: &UploadFile) -> PortResult<Document> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let doc = Document {
            id: next_id(&mut data, "srv-doc"),
            title: file.title(),
            filename: file.name.clone(),
            upload_date: Utc::now(),
            owner_id: "u-1".to_string(),
        };
        data.documents.insert(0, doc.clone());
        Ok(doc)
    }

    async fn delete_document(&self, id: &str) -> PortResult<()> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let before = data.documents.len();
        data.documents.retain(|d| d.id != id);
        if data.documents.len() == before {
            return Err(not_found("document"));
        }
        Ok(())
    }

    async fn list_notes(&self, document_id: &str) -> PortResult<Vec<Note>> {
        self.check()?;
        Ok(self
            .notes()
            .into_iter()
            .filter(|n| n.document_id == document_id)
            .collect())
    }

    async fn create_note(&self, document_id: &str, content: &str) -> PortResult<Note> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let note = new_note(&mut data, document_id, content);
        data.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, note_id: &str, content: &str) -> PortResult<Note> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let note = data
            .notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| not_found("note"))?;
        note.content = content.to_string();
        note.updated_at = Utc::now().max(note.created_at + chrono::Duration::milliseconds(1));
        Ok(note.clone())
    }

    async fn delete_note(&self, note_id: &str) -> PortResult<()> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let before = data.notes.len();
        data.notes.retain(|n| n.id != note_id);
        if data.notes.len() == before {
            return Err(not_found("note"));
        }
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub remote: Arc<FakeLibrary>,
    pub storage: Arc<MemoryStorage>,
}

/// Builds an `AppState` over in-memory storage and a fake backend.
pub fn harness(mode: Mode, demo_seed: bool) -> Harness {
    harness_with(mode, Config {
        demo_seed,
        sync_max_attempts: 3,
        ..Config::default()
    })
}

pub fn harness_with(mode: Mode, config: Config) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let kv: Arc<dyn KeyValueStorage> = storage.clone();
    let session = Arc::new(Session::restore(TokenStore::new(kv.clone())));
    let remote = FakeLibrary::new(mode);
    let state = AppState::assemble(Arc::new(config), kv, session, remote.clone());
    Harness {
        state,
        remote,
        storage,
    }
}

pub fn pdf(name: &str, size: usize) -> UploadFile {
    UploadFile::new(name, "application/pdf", vec![b'%'; size])
}
