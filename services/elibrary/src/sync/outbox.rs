//! services/elibrary/src/sync/outbox.rs
//!
//! Write-ahead log of mutations that were applied locally because the backend
//! was unreachable. The reconciler replays it in order.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use elibrary_core::domain::UploadFile;
use elibrary_core::ports::{KeyValueStorage, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

pub const OUTBOX_KEY: &str = "sync-outbox";

/// A file kept around until its upload can be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn from_upload(file: &UploadFile) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            bytes: file.bytes.clone(),
        }
    }

    pub fn to_upload(&self) -> UploadFile {
        UploadFile::new(self.name.clone(), self.mime_type.clone(), self.bytes.clone())
    }
}

/// A mutation the backend has not seen yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    #[serde(rename_all = "camelCase")]
    UploadDocument { local_id: String, file: PendingFile },
    #[serde(rename_all = "camelCase")]
    DeleteDocument { id: String },
    #[serde(rename_all = "camelCase")]
    CreateNote {
        local_id: String,
        document_id: String,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateNote { note_id: String, content: String },
    #[serde(rename_all = "camelCase")]
    DeleteNote { note_id: String },
}

impl Mutation {
    /// The id of the record this mutation writes.
    pub fn subject(&self) -> &str {
        match self {
            Mutation::UploadDocument { local_id, .. } | Mutation::CreateNote { local_id, .. } => {
                local_id.as_str()
            }
            Mutation::DeleteDocument { id } => id.as_str(),
            Mutation::UpdateNote { note_id, .. } | Mutation::DeleteNote { note_id } => note_id.as_str(),
        }
    }

    fn note_target(&self) -> Option<&str> {
        match self {
            Mutation::UpdateNote { note_id, .. } | Mutation::DeleteNote { note_id } => Some(note_id.as_str()),
            _ => None,
        }
    }

    /// Rewrites references to a record that has just been given its remote id.
    fn remap(&mut self, old: &str, new: &str) {
        match self {
            Mutation::CreateNote { document_id, .. } if document_id == old => {
                *document_id = new.to_string();
            }
            Mutation::UpdateNote { note_id, .. } | Mutation::DeleteNote { note_id } if note_id == old => {
                *note_id = new.to_string();
            }
            Mutation::DeleteDocument { id } if id == old => {
                *id = new.to_string();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub id: Uuid,
    pub mutation: Mutation,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingMutation {
    fn new(mutation: Mutation) -> Self {
        Self {
            id: Uuid::new_v4(),
            mutation,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// How a replayed mutation was settled against the current log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The entry was unchanged and has been removed.
    Done,
    /// The entry was edited while in flight; it now carries the newer change.
    Superseded,
    /// The entry was compacted away while in flight; a compensating entry was queued if needed.
    Vanished,
}

//=========================================================================================
// Compaction
//=========================================================================================

/// Folds `mutation` into the queued items. Returns the mutation if it still
/// needs its own entry.
fn compact(items: &mut Vec<PendingMutation>, mutation: Mutation) -> Option<Mutation> {
    match mutation {
        Mutation::UpdateNote { note_id, content } => {
            if let Some(create) = items.iter_mut().find_map(|item| match &mut item.mutation {
                Mutation::CreateNote {
                    local_id,
                    content: queued,
                    ..
                } if *local_id == note_id => Some(queued),
                _ => None,
            }) {
                *create = content;
                return None;
            }
            items.retain(|item| {
                !matches!(&item.mutation, Mutation::UpdateNote { note_id: queued, .. } if *queued == note_id)
            });
            Some(Mutation::UpdateNote { note_id, content })
        }
        Mutation::DeleteNote { note_id } => {
            let had_create = items.iter().any(|item| {
                matches!(&item.mutation, Mutation::CreateNote { local_id, .. } if *local_id == note_id)
            });
            items.retain(|item| match &item.mutation {
                Mutation::CreateNote { local_id, .. } => *local_id != note_id,
                other => other.note_target() != Some(note_id.as_str()),
            });
            (!had_create).then_some(Mutation::DeleteNote { note_id })
        }
        Mutation::DeleteDocument { id } => {
            let had_upload = items.iter().any(|item| {
                matches!(&item.mutation, Mutation::UploadDocument { local_id, .. } if *local_id == id)
            });
            if !had_upload {
                return Some(Mutation::DeleteDocument { id });
            }
            // The document never reached the backend, so neither can its queued notes.
            let orphaned: Vec<String> = items
                .iter()
                .filter_map(|item| match &item.mutation {
                    Mutation::CreateNote {
                        local_id,
                        document_id,
                        ..
                    } if *document_id == id => Some(local_id.clone()),
                    _ => None,
                })
                .collect();
            items.retain(|item| match &item.mutation {
                Mutation::UploadDocument { local_id, .. } => *local_id != id,
                Mutation::CreateNote { document_id, .. } => *document_id != id,
                other => other
                    .note_target()
                    .map_or(true, |target| !orphaned.iter().any(|o| o == target)),
            });
            None
        }
        other => Some(other),
    }
}

//=========================================================================================
// The Outbox
//=========================================================================================

pub struct Outbox {
    storage: Arc<dyn KeyValueStorage>,
    guard: Mutex<()>,
}

impl Outbox {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            guard: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> PortResult<Vec<PendingMutation>> {
        let Some(raw) = self.storage.get(OUTBOX_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw)
            .map_err(|e| PortError::Storage(format!("unreadable sync outbox: {}", e)))
    }

    fn save(&self, items: &[PendingMutation]) -> PortResult<()> {
        if items.is_empty() {
            return self.storage.remove(OUTBOX_KEY);
        }
        let raw = serde_json::to_string(items).map_err(|e| PortError::Storage(e.to_string()))?;
        self.storage.set(OUTBOX_KEY, &raw)
    }

    /// Queues a mutation, compacting it against what is already queued.
    pub fn enqueue(&self, mutation: Mutation) -> PortResult<()> {
        let _guard = self.lock();
        let mut items = self.load()?;
        if let Some(mutation) = compact(&mut items, mutation) {
            debug!("Queued {:?} for replay", mutation);
            items.push(PendingMutation::new(mutation));
        }
        self.save(&items)
    }

    /// A snapshot of the queued mutations, oldest first.
    pub fn pending(&self) -> PortResult<Vec<PendingMutation>> {
        let _guard = self.lock();
        self.load()
    }

    pub fn len(&self) -> PortResult<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> PortResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether a queued mutation writes the record with `id`.
    pub fn references(&self, id: &str) -> PortResult<bool> {
        Ok(self.pending()?.iter().any(|item| item.mutation.subject() == id))
    }

    fn remove_where(&self, doomed: impl Fn(&Mutation) -> bool) -> PortResult<usize> {
        let _guard = self.lock();
        let mut items = self.load()?;
        let before = items.len();
        items.retain(|item| !doomed(&item.mutation));
        let removed = before - items.len();
        if removed > 0 {
            self.save(&items)?;
        }
        Ok(removed)
    }

    /// Drops queued edits of a note the backend has just accepted a newer edit for.
    pub fn drop_updates(&self, note_id: &str) -> PortResult<usize> {
        self.remove_where(|m| matches!(m, Mutation::UpdateNote { note_id: queued, .. } if queued == note_id))
    }

    /// Drops every queued mutation of a record the backend has just deleted,
    /// including notes queued for creation on it.
    pub fn forget(&self, id: &str) -> PortResult<usize> {
        self.remove_where(|m| {
            m.subject() == id || matches!(m, Mutation::CreateNote { document_id, .. } if document_id == id)
        })
    }

    /// Settles an entry after its mutation was accepted by the backend.
    /// `remote_id` is the id the backend assigned to a created record.
    pub fn settle(&self, item_id: Uuid, replayed: &Mutation, remote_id: Option<&str>) -> PortResult<Settled> {
        let _guard = self.lock();
        let mut items = self.load()?;

        let settled = match items.iter().position(|item| item.id == item_id) {
            Some(pos) if items[pos].mutation == *replayed => {
                items.remove(pos);
                Settled::Done
            }
            Some(pos) => {
                // Only a queued create can change in place (an edit folded into it).
                let folded = match &items[pos].mutation {
                    Mutation::CreateNote { content, .. } => Some(content.clone()),
                    _ => None,
                };
                match (folded, remote_id) {
                    (Some(content), Some(remote_id)) => {
                        items[pos] = PendingMutation::new(Mutation::UpdateNote {
                            note_id: remote_id.to_string(),
                            content,
                        });
                        Settled::Superseded
                    }
                    _ => {
                        items.remove(pos);
                        Settled::Done
                    }
                }
            }
            None => {
                let compensation = match (replayed, remote_id) {
                    (Mutation::CreateNote { .. }, Some(remote_id)) => Some(Mutation::DeleteNote {
                        note_id: remote_id.to_string(),
                    }),
                    (Mutation::UploadDocument { .. }, Some(remote_id)) => Some(Mutation::DeleteDocument {
                        id: remote_id.to_string(),
                    }),
                    _ => None,
                };
                if let Some(mutation) = compensation {
                    items.push(PendingMutation::new(mutation));
                }
                Settled::Vanished
            }
        };

        if let (Some(remote_id), Some(local_id)) = (remote_id, created_local_id(replayed)) {
            for item in items.iter_mut() {
                item.mutation.remap(local_id, remote_id);
            }
        }

        self.save(&items)?;
        Ok(settled)
    }

    /// Records a failed replay and returns the attempt count so far.
    pub fn fail(&self, item_id: Uuid, error: &PortError) -> PortResult<u32> {
        let _guard = self.lock();
        let mut items = self.load()?;
        let Some(item) = items.iter_mut().find(|item| item.id == item_id) else {
            return Ok(0);
        };
        item.attempts += 1;
        item.last_error = Some(error.to_string());
        let attempts = item.attempts;
        self.save(&items)?;
        Ok(attempts)
    }

    /// Gives up on an entry. The local copy of the record is left untouched.
    pub fn discard(&self, item_id: Uuid) -> PortResult<()> {
        let _guard = self.lock();
        let mut items = self.load()?;
        if let Some(pos) = items.iter().position(|item| item.id == item_id) {
            let item = items.remove(pos);
            warn!(
                "Dropping {:?} after {} attempts: {}",
                item.mutation,
                item.attempts,
                item.last_error.unwrap_or_default()
            );
        }
        self.save(&items)
    }
}

fn created_local_id(mutation: &Mutation) -> Option<&str> {
    match mutation {
        Mutation::UploadDocument { local_id, .. } | Mutation::CreateNote { local_id, .. } => {
            Some(local_id.as_str())
        }
        _ => None,
    }
}
