//! services/elibrary/src/sync/reconcile.rs
//!
//! Replays the outbox against the backend, promoting locally persisted
//! records to their remote counterparts.

use crate::adapters::fallback::LocalFallbackStore;
use crate::sync::outbox::{Mutation, Outbox, PendingMutation, Settled};
use elibrary_core::domain::{Document, Note};
use elibrary_core::ports::{LibraryService, PortError, PortResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub replayed: usize,
    /// Entries whose target the backend no longer has.
    pub obsolete: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// What a single replay produced on success.
enum Replayed {
    Document(Document),
    Note(Note),
    Deleted,
    /// The backend answered 404; the record is gone and the entry has nothing left to do.
    Obsolete,
}

pub struct Reconciler {
    remote: Arc<dyn LibraryService>,
    local: Arc<LocalFallbackStore>,
    outbox: Arc<Outbox>,
    max_attempts: u32,
    // One pass at a time.
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn LibraryService>,
        local: Arc<LocalFallbackStore>,
        outbox: Arc<Outbox>,
        max_attempts: u32,
    ) -> Self {
        Self {
            remote,
            local,
            outbox,
            max_attempts: max_attempts.max(1),
            running: Mutex::new(()),
        }
    }

    /// Replays queued mutations oldest first until the log is empty or a
    /// replay fails. Ordering is preserved: a failing entry blocks the ones
    /// behind it until it succeeds or is dropped.
    pub async fn run_once(&self) -> PortResult<ReconcileReport> {
        let _running = self.running.lock().await;
        let mut report = ReconcileReport::default();

        // Settling can rewrite an entry in place, so bound the work per pass.
        let mut budget = self.outbox.len()? * 2 + 1;
        while budget > 0 {
            budget -= 1;
            let Some(item) = self.outbox.pending()?.into_iter().next() else {
                break;
            };

            match self.replay(&item.mutation).await {
                Ok(Replayed::Obsolete) => {
                    warn!("Skipping {:?}: the backend no longer has its target", item.mutation);
                    self.outbox.settle(item.id, &item.mutation, None)?;
                    report.obsolete += 1;
                }
                Ok(outcome) => {
                    self.settle(&item, outcome)?;
                    report.replayed += 1;
                }
                Err(e @ (PortError::Network(_) | PortError::Unauthorized)) => {
                    self.outbox.fail(item.id, &e)?;
                    debug!("Backend unavailable, pausing replay: {}", e);
                    break;
                }
                Err(e) => {
                    let attempts = self.outbox.fail(item.id, &e)?;
                    if attempts >= self.max_attempts {
                        self.outbox.discard(item.id)?;
                        report.dropped += 1;
                        continue;
                    }
                    warn!(
                        "Replay of {:?} rejected (attempt {}/{}): {}",
                        item.mutation, attempts, self.max_attempts, e
                    );
                    break;
                }
            }
        }

        report.remaining = self.outbox.len()?;
        if report.replayed > 0 || report.obsolete > 0 || report.dropped > 0 {
            info!(
                "Reconciled {} mutations ({} obsolete, {} dropped, {} remaining)",
                report.replayed, report.obsolete, report.dropped, report.remaining
            );
        }
        Ok(report)
    }

    async fn replay(&self, mutation: &Mutation) -> PortResult<Replayed> {
        match mutation {
            Mutation::UploadDocument { file, .. } => self
                .remote
                .upload_document(&file.to_upload())
                .await
                .map(Replayed::Document),
            Mutation::DeleteDocument { id } => deleted(self.remote.delete_document(id).await),
            Mutation::CreateNote {
                document_id,
                content,
                ..
            } => obsolete_if_missing(
                self.remote
                    .create_note(document_id, content)
                    .await
                    .map(Replayed::Note),
            ),
            Mutation::UpdateNote { note_id, content } => obsolete_if_missing(
                self.remote
                    .update_note(note_id, content)
                    .await
                    .map(Replayed::Note),
            ),
            Mutation::DeleteNote { note_id } => deleted(self.remote.delete_note(note_id).await),
        }
    }

    /// Removes the replayed entry and promotes the local record it created.
    fn settle(&self, item: &PendingMutation, outcome: Replayed) -> PortResult<()> {
        match (&item.mutation, outcome) {
            (Mutation::UploadDocument { local_id, .. }, Replayed::Document(doc)) => {
                if self.outbox.settle(item.id, &item.mutation, Some(&doc.id))? != Settled::Vanished {
                    self.local.promote_document(local_id, &doc)?;
                }
            }
            (Mutation::CreateNote { local_id, .. }, Replayed::Note(note)) => {
                match self.outbox.settle(item.id, &item.mutation, Some(&note.id))? {
                    Settled::Done => self.local.put_note(local_id, &note)?,
                    Settled::Superseded => {
                        // Keep the newer local text; only the id changes.
                        if let Some(mut current) = self.local.note(local_id)? {
                            current.id = note.id.clone();
                            self.local.put_note(local_id, &current)?;
                        }
                    }
                    Settled::Vanished => {}
                }
            }
            (Mutation::UpdateNote { note_id, .. }, Replayed::Note(note)) => {
                if self.outbox.settle(item.id, &item.mutation, None)? == Settled::Done {
                    self.local.put_note(note_id, &note)?;
                }
            }
            (mutation, _) => {
                self.outbox.settle(item.id, mutation, None)?;
            }
        }
        Ok(())
    }

    /// Runs a pass every `every` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Background reconciliation every {:?}", every);
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Background reconciliation stopped.");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Reconciliation pass failed: {:?}", e);
                        }
                    }
                }
            }
        })
    }
}

/// A note write whose target was deleted on the backend cannot succeed later.
fn obsolete_if_missing(result: PortResult<Replayed>) -> PortResult<Replayed> {
    match result {
        Err(PortError::Remote { status: 404, .. }) => Ok(Replayed::Obsolete),
        other => other,
    }
}

/// A delete the backend no longer knows about has nothing left to do.
fn deleted(result: PortResult<()>) -> PortResult<Replayed> {
    match result {
        Ok(()) | Err(PortError::Remote { status: 404, .. }) => Ok(Replayed::Deleted),
        Err(e) => Err(e),
    }
}
