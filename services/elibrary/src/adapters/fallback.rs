//! services/elibrary/src/adapters/fallback.rs
//!
//! The local fallback store: documents and per-document notes mirrored in
//! key-value storage, used whenever the backend cannot be reached.
//!
//! Collections are JSON arrays stored newest-first. A collection whose key is
//! absent is seeded from the injected `SeedProvider` on first read; a key that
//! exists but holds an empty array is left alone, so seeding happens at most
//! once per key.

use crate::adapters::records::{DocumentRecord, LastUploadRecord, NoteRecord};
use chrono::{DateTime, Duration, Utc};
use elibrary_core::domain::{Document, LastUpload, Note};
use elibrary_core::ports::{KeyValueStorage, PortError, PortResult, SeedProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const DOCUMENTS_KEY: &str = "demo-pdfs";
pub const NOTES_PREFIX: &str = "demo-notes:";
pub const LAST_UPLOAD_KEY: &str = "demo-last-upload";

pub fn notes_key(document_id: &str) -> String {
    format!("{}{}", NOTES_PREFIX, document_id)
}

/// Records addressable by id inside a collection.
pub trait Keyed {
    fn key_id(&self) -> &str;
}

impl Keyed for DocumentRecord {
    fn key_id(&self) -> &str {
        &self.id
    }
}

impl Keyed for NoteRecord {
    fn key_id(&self) -> &str {
        &self.id
    }
}

//=========================================================================================
// Local Id Generation
//=========================================================================================

/// Millisecond-timestamp ids, strictly increasing within the process.
#[derive(Default)]
pub struct LocalIds {
    last: Mutex<i64>,
}

impl LocalIds {
    pub fn next(&self) -> String {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now().timestamp_millis();
        *last = if now > *last { now } else { *last + 1 };
        last.to_string()
    }
}

//=========================================================================================
// The Store
//=========================================================================================

pub struct LocalFallbackStore {
    storage: Arc<dyn KeyValueStorage>,
    seed: Arc<dyn SeedProvider>,
    ids: LocalIds,
    // Serializes read-modify-write sequences within this process.
    guard: Mutex<()>,
}

impl LocalFallbackStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, seed: Arc<dyn SeedProvider>) -> Self {
        Self {
            storage,
            seed,
            ids: LocalIds::default(),
            guard: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A fresh id for a record created locally.
    pub fn new_id(&self) -> String {
        self.ids.next()
    }

    pub fn placeholder_document(&self, id: &str) -> Option<Document> {
        self.seed.placeholder_document(id, Utc::now())
    }

    // --- Generic collection operations ---

    /// Reads a collection. `None` means the key has never been written.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> PortResult<Option<Vec<T>>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(records) => Ok(Some(records)),
            Err(e) => {
                warn!("Unreadable local collection '{}', treating as empty: {:?}", key, e);
                Ok(Some(Vec::new()))
            }
        }
    }

    /// Replaces the whole collection.
    pub fn write<T: Serialize>(&self, key: &str, records: &[T]) -> PortResult<()> {
        let raw = serde_json::to_string(records).map_err(|e| PortError::Storage(e.to_string()))?;
        self.storage.set(key, &raw)
    }

    /// Inserts `record` at the front, dropping any older record with the same id.
    pub fn append<T>(&self, key: &str, record: T) -> PortResult<()>
    where
        T: Serialize + DeserializeOwned + Keyed,
    {
        let mut records: Vec<T> = self.read(key)?.unwrap_or_default();
        records.retain(|r| r.key_id() != record.key_id());
        records.insert(0, record);
        self.write(key, &records)
    }

    /// Removes the record with `id`. Returns whether anything was removed.
    pub fn remove_by_id<T>(&self, key: &str, id: &str) -> PortResult<bool>
    where
        T: Serialize + DeserializeOwned + Keyed,
    {
        let Some(mut records) = self.read::<T>(key)? else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.key_id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write(key, &records)?;
        Ok(true)
    }

    // --- Documents ---

    fn documents_locked(&self) -> PortResult<Vec<DocumentRecord>> {
        if let Some(records) = self.read::<DocumentRecord>(DOCUMENTS_KEY)? {
            return Ok(records);
        }
        let seeded: Vec<DocumentRecord> = self
            .seed
            .documents(Utc::now())
            .iter()
            .map(DocumentRecord::from_domain)
            .collect();
        self.write(DOCUMENTS_KEY, &seeded)?;
        if !seeded.is_empty() {
            info!("Seeded local library with {} documents", seeded.len());
        }
        Ok(seeded)
    }

    /// All local documents, newest first, seeding on first access.
    pub fn documents(&self) -> PortResult<Vec<Document>> {
        let _guard = self.lock();
        Ok(self
            .documents_locked()?
            .into_iter()
            .map(DocumentRecord::to_domain)
            .collect())
    }

    pub fn document(&self, id: &str) -> PortResult<Option<Document>> {
        Ok(self.documents()?.into_iter().find(|d| d.id == id))
    }

    /// Adds a document created while offline. Seeds the collection first,
    /// so the fallback view stays the one the user has been shown.
    pub fn add_document(&self, doc: &Document) -> PortResult<()> {
        let _guard = self.lock();
        self.documents_locked()?;
        self.append(DOCUMENTS_KEY, DocumentRecord::from_domain(doc))
    }

    /// Mirrors a document the backend accepted. Never seeds.
    pub fn mirror_document(&self, doc: &Document) -> PortResult<()> {
        let _guard = self.lock();
        self.append(DOCUMENTS_KEY, DocumentRecord::from_domain(doc))
    }

    /// Removes the document. Its notes stay behind as orphans.
    pub fn remove_document(&self, id: &str) -> PortResult<bool> {
        let _guard = self.lock();
        self.remove_by_id::<DocumentRecord>(DOCUMENTS_KEY, id)
    }

    /// Swaps a locally created document for its remote counterpart and moves
    /// its notes collection to the new id.
    pub fn promote_document(&self, local_id: &str, remote: &Document) -> PortResult<()> {
        let _guard = self.lock();
        let mut records = self
            .read::<DocumentRecord>(DOCUMENTS_KEY)?
            .unwrap_or_default();
        records.retain(|r| r.id != remote.id || r.id == local_id);
        match records.iter_mut().find(|r| r.id == local_id) {
            Some(slot) => *slot = DocumentRecord::from_domain(remote),
            None => records.insert(0, DocumentRecord::from_domain(remote)),
        }
        self.write(DOCUMENTS_KEY, &records)?;

        if local_id != remote.id {
            let old_key = notes_key(local_id);
            if let Some(mut notes) = self.read::<NoteRecord>(&old_key)? {
                for note in notes.iter_mut() {
                    note.pdf_id = remote.id.clone();
                }
                let new_key = notes_key(&remote.id);
                let mut merged = self.read::<NoteRecord>(&new_key)?.unwrap_or_default();
                merged.retain(|existing| notes.iter().all(|n| n.id != existing.id));
                notes.extend(merged);
                self.write(&new_key, &notes)?;
                self.storage.remove(&old_key)?;
            }
        }
        debug!("Promoted local document {} to {}", local_id, remote.id);
        Ok(())
    }

    // --- Notes ---

    fn notes_locked(&self, document_id: &str) -> PortResult<Vec<NoteRecord>> {
        let key = notes_key(document_id);
        if let Some(records) = self.read::<NoteRecord>(&key)? {
            return Ok(records);
        }
        let seeded: Vec<NoteRecord> = self
            .seed
            .notes(document_id, Utc::now())
            .iter()
            .map(NoteRecord::from_domain)
            .collect();
        self.write(&key, &seeded)?;
        Ok(seeded)
    }

    /// Notes of one document, newest first, seeding on first access.
    pub fn notes(&self, document_id: &str) -> PortResult<Vec<Note>> {
        let _guard = self.lock();
        Ok(self
            .notes_locked(document_id)?
            .into_iter()
            .map(NoteRecord::to_domain)
            .collect())
    }

    /// Adds a note created while offline, seeding its collection first.
    pub fn add_note(&self, note: &Note) -> PortResult<()> {
        let _guard = self.lock();
        self.notes_locked(&note.document_id)?;
        self.append(&notes_key(&note.document_id), NoteRecord::from_domain(note))
    }

    /// Mirrors a note the backend accepted. Never seeds.
    pub fn mirror_note(&self, note: &Note) -> PortResult<()> {
        let _guard = self.lock();
        self.append(&notes_key(&note.document_id), NoteRecord::from_domain(note))
    }

    /// Locates a note in any document's collection.
    fn find_note_locked(&self, note_id: &str) -> PortResult<Option<(String, Vec<NoteRecord>, usize)>> {
        for key in self.storage.keys()? {
            if !key.starts_with(NOTES_PREFIX) {
                continue;
            }
            if let Some(records) = self.read::<NoteRecord>(&key)? {
                if let Some(pos) = records.iter().position(|n| n.id == note_id) {
                    return Ok(Some((key, records, pos)));
                }
            }
        }
        Ok(None)
    }

    pub fn note(&self, note_id: &str) -> PortResult<Option<Note>> {
        let _guard = self.lock();
        Ok(self
            .find_note_locked(note_id)?
            .map(|(_, mut records, pos)| records.swap_remove(pos).to_domain()))
    }

    /// Edits a note in place. `updated_at` always moves strictly forward.
    pub fn edit_note(&self, note_id: &str, content: &str, now: DateTime<Utc>) -> PortResult<Note> {
        let _guard = self.lock();
        let (key, mut records, pos) = self
            .find_note_locked(note_id)?
            .ok_or_else(|| PortError::NotFound(format!("Note {} not found", note_id)))?;

        let note = &mut records[pos];
        note.content = content.to_string();
        note.updated_at = next_edit_time(note.created_at, note.updated_at, now);
        let edited = note.clone();
        self.write(&key, &records)?;
        Ok(edited.to_domain())
    }

    /// Stores `note` under its document, replacing the record with `old_id`
    /// (and any stale duplicate of the new id) or prepending when neither exists.
    /// Never seeds.
    pub fn put_note(&self, old_id: &str, note: &Note) -> PortResult<()> {
        let _guard = self.lock();
        let key = notes_key(&note.document_id);
        let mut records = self.read::<NoteRecord>(&key)?.unwrap_or_default();
        records.retain(|r| r.id != note.id || r.id == old_id);
        match records.iter_mut().find(|r| r.id == old_id) {
            Some(slot) => *slot = NoteRecord::from_domain(note),
            None => records.insert(0, NoteRecord::from_domain(note)),
        }
        self.write(&key, &records)
    }

    pub fn remove_note(&self, note_id: &str) -> PortResult<bool> {
        let _guard = self.lock();
        let Some((key, mut records, pos)) = self.find_note_locked(note_id)? else {
            return Ok(false);
        };
        records.remove(pos);
        self.write(&key, &records)?;
        Ok(true)
    }

    // --- Last upload slot ---

    pub fn stash_last_upload(&self, upload: &LastUpload) -> PortResult<()> {
        let raw = serde_json::to_string(&LastUploadRecord::from_domain(upload))
            .map_err(|e| PortError::Storage(e.to_string()))?;
        self.storage.set(LAST_UPLOAD_KEY, &raw)
    }

    /// Returns the last upload and clears the slot.
    pub fn take_last_upload(&self) -> PortResult<Option<LastUpload>> {
        let _guard = self.lock();
        let Some(raw) = self.storage.get(LAST_UPLOAD_KEY)? else {
            return Ok(None);
        };
        self.storage.remove(LAST_UPLOAD_KEY)?;
        match serde_json::from_str::<LastUploadRecord>(&raw) {
            Ok(record) => Ok(Some(record.to_domain())),
            Err(e) => {
                warn!("Discarding unreadable last-upload record: {:?}", e);
                Ok(None)
            }
        }
    }
}

/// Edit timestamp: `now`, unless the clock has not moved past the previous edit.
fn next_edit_time(created_at: DateTime<Utc>, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = created_at.max(updated_at) + Duration::microseconds(1);
    now.max(floor)
}
