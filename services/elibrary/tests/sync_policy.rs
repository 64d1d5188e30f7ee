mod common;

use common::{harness, harness_with, pdf, Mode};
use elibrary_core::ports::PortError;
use elibrary_core::validation::{ValidationError, MAX_UPLOAD_BYTES};
use elibrary_core::UploadFile;
use elibrary_lib::config::Config;
use elibrary_lib::sync::SyncState;

#[tokio::test]
async fn rejects_non_pdf_without_calling_the_backend() {
    let h = harness(Mode::Online, false);
    let file = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());

    let err = h.state.library.upload_document(file).await.unwrap_err();

    assert!(matches!(
        err,
        PortError::Validation(ValidationError::NotPdf { .. })
    ));
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn rejects_oversized_upload_without_calling_the_backend() {
    let h = harness(Mode::Online, false);

    let err = h
        .state
        .library
        .upload_document(pdf("huge.pdf", MAX_UPLOAD_BYTES + 1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PortError::Validation(ValidationError::TooLarge { .. })
    ));
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn blank_note_is_rejected_before_the_backend() {
    let h = harness(Mode::Online, false);

    let err = h.state.library.create_note("1", "   \n").await.unwrap_err();

    assert!(matches!(err, PortError::Validation(ValidationError::EmptyNote)));
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn empty_store_lists_the_demo_titles_newest_first() {
    let h = harness(Mode::Offline, true);

    let docs = h.state.library.list_documents().await.unwrap();

    assert!(docs.is_local());
    let titles: Vec<&str> = docs.value.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Introduction to Machine Learning",
            "React Development Guide",
            "Database Design Principles",
        ]
    );

    // Seeding happens once; a second read sees the same collection.
    let again = h.state.library.list_documents().await.unwrap();
    assert_eq!(again.value, docs.value);
}

#[tokio::test]
async fn search_filters_the_local_fallback() {
    let h = harness(Mode::Offline, true);

    let found = h.state.library.search_documents("REACT").await.unwrap();

    assert_eq!(found.value.len(), 1);
    assert_eq!(found.value[0].filename, "react-guide.pdf");
}

#[tokio::test]
async fn note_created_while_offline_is_listed_afterwards() {
    let h = harness(Mode::Offline, true);
    let library = &h.state.library;

    let created = library.create_note("2", "  Remember chapter 4  ").await.unwrap();

    assert_eq!(created.state, SyncState::PersistedLocal);
    assert_eq!(created.value.content, "Remember chapter 4");
    assert!(!created.value.id.is_empty());
    assert_eq!(created.value.created_at, created.value.updated_at);
    assert!(!created.value.is_edited());

    let notes = library.list_notes("2").await.unwrap();
    assert_eq!(notes.value.len(), 3);
    assert_eq!(notes.value[0].id, created.value.id);
    assert_eq!(
        library.sync_state(&created.value.id).unwrap(),
        SyncState::PersistedLocal
    );
}

#[tokio::test]
async fn remote_error_status_also_falls_back() {
    let h = harness(Mode::Failing(503), false);

    let created = h.state.library.create_note("doc-1", "offline thought").await.unwrap();

    assert!(created.is_local());
    assert_eq!(h.state.library.pending_mutations().unwrap().len(), 1);
}

#[tokio::test]
async fn offline_edit_advances_updated_at() {
    let h = harness(Mode::Offline, true);
    let library = &h.state.library;
    let created = library.create_note("1", "first draft").await.unwrap().value;

    let edited = library.update_note(&created.id, "second draft").await.unwrap();

    assert!(edited.is_local());
    assert_eq!(edited.value.content, "second draft");
    assert_eq!(edited.value.created_at, created.created_at);
    assert!(edited.value.updated_at > created.updated_at);
    assert!(edited.value.is_edited());

    let listed = library.list_notes("1").await.unwrap().value;
    let stored = listed.iter().find(|n| n.id == created.id).unwrap();
    assert_eq!(stored.content, "second draft");
}

#[tokio::test]
async fn offline_edit_of_an_unknown_note_is_not_found() {
    let h = harness(Mode::Offline, false);

    let err = h.state.library.update_note("missing", "text").await.unwrap_err();

    assert!(matches!(err, PortError::NotFound(_)));
    assert!(h.state.library.pending_mutations().unwrap().is_empty());
}

#[tokio::test]
async fn offline_delete_removes_exactly_one_note() {
    let h = harness(Mode::Offline, true);
    let library = &h.state.library;
    assert_eq!(library.list_notes("1").await.unwrap().value.len(), 2);

    library.delete_note("1-sample-1").await.unwrap();

    let remaining = library.list_notes("1").await.unwrap().value;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "1-sample-2");
    assert_eq!(library.list_notes("2").await.unwrap().value.len(), 2);
}

#[tokio::test]
async fn offline_upload_creates_a_local_document() {
    let h = harness(Mode::Offline, true);
    let library = &h.state.library;

    let doc = library.upload_document(pdf("Thesis.pdf", 2048)).await.unwrap();

    assert!(doc.is_local());
    assert_eq!(doc.value.title, "Thesis");
    assert_eq!(doc.value.filename, "Thesis.pdf");
    let docs = library.list_documents().await.unwrap().value;
    assert_eq!(docs.len(), 4);
    assert_eq!(docs[0].id, doc.value.id);
}

#[tokio::test]
async fn last_upload_is_handed_out_once() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let doc = library.upload_document(pdf("paper.pdf", 512)).await.unwrap();

    let last = library.take_last_upload().unwrap().unwrap();
    assert_eq!(last.name, "paper.pdf");
    assert_eq!(last.size, 512);
    assert_eq!(last.document_id, doc.value.id);

    assert!(library.take_last_upload().unwrap().is_none());
}

#[tokio::test]
async fn successful_writes_are_mirrored_locally() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;
    let doc = library.upload_document(pdf("mirror.pdf", 64)).await.unwrap();
    let note = library.create_note(&doc.value.id, "kept").await.unwrap();
    assert_eq!(doc.state, SyncState::Persisted);
    assert_eq!(note.state, SyncState::Persisted);

    h.remote.set_mode(Mode::Offline);

    let docs = library.list_documents().await.unwrap();
    assert!(docs.is_local());
    assert_eq!(docs.value, vec![doc.value.clone()]);
    let notes = library.list_notes(&doc.value.id).await.unwrap();
    assert_eq!(notes.value, vec![note.value]);
    assert!(library.pending_mutations().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_is_returned_and_nothing_is_queued() {
    let h = harness(Mode::Failing(401), true);
    let library = &h.state.library;

    let err = library.create_note("1", "text").await.unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));

    let err = library.list_documents().await.unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));
    assert!(library.pending_mutations().unwrap().is_empty());
}

#[tokio::test]
async fn missing_document_falls_back_to_placeholder_only_with_demo_seed() {
    let seeded = harness(Mode::Offline, true);
    let doc = seeded.state.library.get_document("42").await.unwrap();
    assert_eq!(doc.value.id, "42");
    assert_eq!(doc.value.title, "Sample Document");

    let bare = harness(Mode::Offline, false);
    let err = bare.state.library.get_document("42").await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn login_stores_the_session_and_logout_clears_it() {
    let h = harness(Mode::Online, false);
    let library = &h.state.library;

    let grant = library.login("reader@example.com", "secret").await.unwrap();

    assert_eq!(grant.token, "jwt-remote");
    assert_eq!(h.state.session.token().as_deref(), Some("jwt-remote"));
    assert_eq!(h.state.session.user().unwrap().email, "reader@example.com");

    library.logout().unwrap();
    assert!(!h.state.session.is_authenticated());
    assert!(h.state.session.user().is_none());
}

#[tokio::test]
async fn login_requires_credentials() {
    let h = harness(Mode::Online, false);

    let err = h.state.library.login("", "secret").await.unwrap_err();

    assert!(matches!(
        err,
        PortError::Validation(ValidationError::MissingField("email"))
    ));
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn offline_login_fails_unless_demo_auth_is_enabled() {
    let strict = harness(Mode::Offline, false);
    let err = strict.state.library.login("a@b.c", "pw").await.unwrap_err();
    assert!(matches!(err, PortError::Network(_)));
    assert!(!strict.state.session.is_authenticated());

    let demo = harness_with(
        Mode::Offline,
        Config {
            demo_auth: true,
            ..Config::default()
        },
    );
    let grant = demo.state.library.login("ada@example.com", "pw").await.unwrap();
    assert!(grant.token.starts_with("demo-jwt-token-"));
    assert_eq!(grant.user.username, "ada");
    assert!(demo.state.session.is_authenticated());
}

#[tokio::test]
async fn demo_auth_does_not_cover_rejected_credentials() {
    let h = harness_with(
        Mode::Failing(401),
        Config {
            demo_auth: true,
            ..Config::default()
        },
    );

    let err = h.state.library.login("a@b.c", "wrong").await.unwrap_err();

    assert!(matches!(err, PortError::Unauthorized));
    assert!(!h.state.session.is_authenticated());
}

#[tokio::test]
async fn online_writes_do_not_mix_demo_data_into_the_mirror() {
    let h = harness(Mode::Online, true);
    let library = &h.state.library;
    let doc = library.upload_document(pdf("real.pdf", 64)).await.unwrap().value;
    let note = library.create_note(&doc.id, "my own note").await.unwrap().value;

    h.remote.set_mode(Mode::Offline);

    let docs = library.list_documents().await.unwrap().value;
    let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["real"]);
    let notes = library.list_notes(&doc.id).await.unwrap().value;
    assert_eq!(notes, vec![note]);
}

#[tokio::test]
async fn sync_state_follows_the_record_itself() {
    let h = harness(Mode::Offline, false);
    let library = &h.state.library;

    let note = library.create_note("srv-doc", "queued").await.unwrap().value;

    assert_eq!(library.sync_state(&note.id).unwrap(), SyncState::PersistedLocal);
    assert_eq!(library.sync_state("srv-doc").unwrap(), SyncState::Persisted);
}
