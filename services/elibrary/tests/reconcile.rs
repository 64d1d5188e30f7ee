mod common;

use common::{harness, pdf, Mode};
use elibrary_lib::config::Config;
use elibrary_lib::sync::{Mutation, SyncState};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn offline_note_is_replayed_and_promoted() {
    let h = harness(Mode::Offline, false);
    let library = &h.state.library;
    let local = library.create_note("doc-1", "written on the train").await.unwrap().value;
    assert_eq!(library.pending_mutations().unwrap().len(), 1);

    h.remote.set_mode(Mode::Online);
    let report = h.state.reconciler.run_once().await.unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 0);
    let remote_notes = h.remote.notes();
    assert_eq!(remote_notes.len(), 1);
    assert_eq!(remote_notes[0].content, "written on the train");

    // The local copy now carries the backend id.
    h.remote.set_mode(Mode::Offline);
    let notes = library.list_notes("doc-1").await.unwrap().value;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, remote_notes[0].id);
    assert_ne!(notes[0].id, local.id);
    assert_eq!(library.sync_state(&notes[0].id).unwrap(), SyncState::Persisted);
}

#[tokio::test]
async fn notes_on_an_offline_upload_follow_the_document() {
    let h = harness(Mode::Offline, false);
    let library = &h.state.library;
    let doc = library.upload_document(pdf("draft.pdf", 128)).await.unwrap().value;
    library.create_note(&doc.id, "margin note").await.unwrap();

    h.remote.set_mode(Mode::Online);
    let report = h.state.reconciler.run_once().await.unwrap();
    assert_eq!(report.replayed, 2);

    let remote_doc = h.remote.documents().into_iter().next().unwrap();
    assert_eq!(remote_doc.filename, "draft.pdf");
    let remote_note = h.remote.notes().into_iter().next().unwrap();
    assert_eq!(remote_note.document_id, remote_doc.id);

    h.remote.set_mode(Mode::Offline);
    let docs = library.list_documents().await.unwrap().value;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, remote_doc.id);
    let notes = library.list_notes(&remote_doc.id).await.unwrap().value;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, remote_note.id);
    assert!(library.list_notes(&doc.id).await.unwrap().value.is_empty());
}

#[tokio::test]
async fn edits_to_an_unsynced_note_are_folded_into_its_creation() {
    let h = harness(Mode::Offline, false);
    let library = &h.state.library;
    let note = library.create_note("doc-1", "v1").await.unwrap().value;
    library.update_note(&note.id, "v2").await.unwrap();

    let pending = library.pending_mutations().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        &pending[0].mutation,
        Mutation::CreateNote { content, .. } if content == "v2"
    ));

    h.remote.set_mode(Mode::Online);
    h.state.reconciler.run_once().await.unwrap();
    assert_eq!(h.remote.notes()[0].content, "v2");
}

#[tokio::test]
async fn deleting_an_unsynced_note_never_reaches_the_backend() {
    let h = harness(Mode::Offline, false);
    let library = &h.state.library;
    let note = library.create_note("doc-1", "scratch").await.unwrap().value;
    library.delete_note(&note.id).await.unwrap();
    assert!(library.pending_mutations().unwrap().is_empty());

    h.remote.set_mode(Mode::Online);
    let calls_before = h.remote.calls();
    let report = h.state.reconciler.run_once().await.unwrap();

    assert_eq!(report.replayed, 0);
    assert_eq!(h.remote.calls(), calls_before);
    assert!(h.remote.notes().is_empty());
}

#[tokio::test]
async fn offline_edit_of_a_synced_note_is_replayed() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let note = library.create_note("doc-1", "online text").await.unwrap().value;

    h.remote.set_mode(Mode::Offline);
    library.update_note(&note.id, "offline text").await.unwrap();
    assert_eq!(library.sync_state(&note.id).unwrap(), SyncState::PersistedLocal);

    h.remote.set_mode(Mode::Online);
    h.state.reconciler.run_once().await.unwrap();

    assert_eq!(h.remote.notes()[0].content, "offline text");
    assert_eq!(library.sync_state(&note.id).unwrap(), SyncState::Persisted);
}

#[tokio::test]
async fn delete_of_a_record_the_backend_never_had_counts_as_done() {
    let h = harness(Mode::Offline, true);
    h.state.library.delete_document("2").await.unwrap();

    h.remote.set_mode(Mode::Online);
    let report = h.state.reconciler.run_once().await.unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn unreachable_backend_leaves_the_queue_untouched() {
    let h = harness(Mode::Offline, false);
    h.state.library.create_note("doc-1", "one").await.unwrap();
    h.state.library.create_note("doc-1", "two").await.unwrap();

    let report = h.state.reconciler.run_once().await.unwrap();

    assert_eq!(report.replayed, 0);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.remaining, 2);
    let pending = h.state.library.pending_mutations().unwrap();
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[1].attempts, 0);
}

#[tokio::test]
async fn rejected_entry_is_dropped_after_max_attempts() {
    // The harness caps replays at three attempts.
    let h = harness(Mode::Offline, false);
    h.state.library.create_note("doc-1", "doomed").await.unwrap();
    h.remote.set_mode(Mode::Failing(422));

    for attempt in 1..=2 {
        let report = h.state.reconciler.run_once().await.unwrap();
        assert_eq!(report.remaining, 1);
        let pending = h.state.library.pending_mutations().unwrap();
        assert_eq!(pending[0].attempts, attempt);
        assert!(pending[0].last_error.as_deref().unwrap().contains("422"));
    }

    let report = h.state.reconciler.run_once().await.unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.remaining, 0);

    // The local copy survives the drop.
    h.remote.set_mode(Mode::Offline);
    let notes = h.state.library.list_notes("doc-1").await.unwrap().value;
    assert_eq!(notes.len(), 1);
}

#[tokio::test]
async fn queue_survives_a_restart_on_the_same_storage() {
    let h = harness(Mode::Offline, false);
    h.state.library.create_note("doc-1", "persisted").await.unwrap();

    let reopened = elibrary_lib::state::AppState::assemble(
        h.state.config.clone(),
        h.storage.clone(),
        h.state.session.clone(),
        h.remote.clone(),
    );

    assert_eq!(reopened.library.pending_mutations().unwrap().len(), 1);
}

#[tokio::test]
async fn background_sync_replays_until_cancelled() {
    let h = common::harness_with(
        Mode::Offline,
        Config {
            demo_seed: false,
            sync_interval: Some(Duration::from_millis(20)),
            ..Config::default()
        },
    );
    h.state.library.create_note("doc-1", "later").await.unwrap();
    h.remote.set_mode(Mode::Online);

    let cancel = CancellationToken::new();
    let handle = h.state.start_background_sync(cancel.clone()).unwrap();

    let mut drained = false;
    for _ in 0..100 {
        if h.state.library.pending_mutations().unwrap().is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(drained);
    assert_eq!(h.remote.notes().len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn background_sync_can_be_disabled() {
    let h = common::harness_with(
        Mode::Online,
        Config {
            sync_interval: None,
            ..Config::default()
        },
    );

    assert!(h
        .state
        .start_background_sync(CancellationToken::new())
        .is_none());
}

#[tokio::test]
async fn online_edit_discards_an_older_offline_edit() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let note = library.create_note("doc-1", "v1").await.unwrap().value;

    h.remote.set_mode(Mode::Offline);
    library.update_note(&note.id, "offline edit").await.unwrap();
    assert_eq!(library.pending_mutations().unwrap().len(), 1);

    h.remote.set_mode(Mode::Online);
    let newest = library.update_note(&note.id, "newest online edit").await.unwrap();
    assert_eq!(newest.state, SyncState::Persisted);
    assert!(library.pending_mutations().unwrap().is_empty());

    let report = h.state.reconciler.run_once().await.unwrap();
    assert_eq!(report.replayed, 0);
    assert_eq!(h.remote.notes()[0].content, "newest online edit");

    h.remote.set_mode(Mode::Offline);
    let local = library.list_notes("doc-1").await.unwrap().value;
    assert_eq!(local[0].content, "newest online edit");
}

#[tokio::test]
async fn online_delete_discards_queued_changes_to_the_record() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let note = library.create_note("doc-1", "v1").await.unwrap().value;

    h.remote.set_mode(Mode::Offline);
    library.update_note(&note.id, "offline edit").await.unwrap();

    h.remote.set_mode(Mode::Online);
    library.delete_note(&note.id).await.unwrap();
    assert!(library.pending_mutations().unwrap().is_empty());

    let report = h.state.reconciler.run_once().await.unwrap();
    assert_eq!(report.replayed, 0);
    assert!(h.remote.notes().is_empty());
}

#[tokio::test]
async fn online_document_delete_discards_notes_queued_on_it() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let doc = library.upload_document(pdf("gone.pdf", 64)).await.unwrap().value;

    h.remote.set_mode(Mode::Offline);
    library.create_note(&doc.id, "never sent").await.unwrap();
    library.create_note("doc-2", "still wanted").await.unwrap();

    h.remote.set_mode(Mode::Online);
    library.delete_document(&doc.id).await.unwrap();

    let pending = library.pending_mutations().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        &pending[0].mutation,
        Mutation::CreateNote { document_id, .. } if document_id == "doc-2"
    ));
}

#[tokio::test]
async fn edit_of_a_note_deleted_elsewhere_does_not_block_the_queue() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let first = library.create_note("doc-1", "first").await.unwrap().value;

    h.remote.set_mode(Mode::Offline);
    library.update_note(&first.id, "edited offline").await.unwrap();
    library.create_note("doc-1", "second").await.unwrap();

    // Another device removes the first note before this client reconnects.
    h.remote.remove_note(&first.id);
    h.remote.set_mode(Mode::Online);
    let report = h.state.reconciler.run_once().await.unwrap();

    assert_eq!(report.obsolete, 1);
    assert_eq!(report.replayed, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.remaining, 0);
    let contents: Vec<String> = h.remote.notes().into_iter().map(|n| n.content).collect();
    assert_eq!(contents, vec!["second".to_string()]);
}
