//! services/elibrary/src/bin/elibrary.rs

use chrono::Local;
use clap::{Parser, Subcommand};
use elibrary_core::domain::{Document, Note, UploadFile, PDF_MIME_TYPE};
use elibrary_lib::{
    config::Config,
    error::ClientError,
    session::SessionEvent,
    state::AppState,
    sync::{SyncState, Synced},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "elibrary", about = "Upload, browse and annotate your PDF library")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with an existing account
    Login { email: String, password: String },
    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List documents, newest first
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one document and its notes
    Show { id: String },
    /// Upload a PDF (10 MB max)
    Upload { path: PathBuf },
    /// Delete a document
    Delete { id: String },
    /// List the notes of a document
    Notes { document_id: String },
    /// Add, edit or remove notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },
    /// Replay changes made while the backend was unreachable
    Sync {
        /// Keep reconciling in the background until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Show the session and the queued changes
    Status,
}

#[derive(Subcommand)]
enum NoteAction {
    Add { document_id: String, content: String },
    Edit { note_id: String, content: String },
    Rm { note_id: String },
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Using backend at {}", config.api_url);

    // --- 2. Build the Shared AppState ---
    let state = AppState::from_config(config)?;
    let mut events = state.session.subscribe();

    // --- 3. Run the Command ---
    let result = run(&state, cli.command).await;

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::LoginRequired { redirect_to } = event {
            eprintln!("Your session has expired. Please sign in again ({}).", redirect_to);
        }
    }
    result
}

async fn run(state: &AppState, command: Command) -> Result<(), ClientError> {
    let library = &state.library;
    match command {
        Command::Login { email, password } => {
            let grant = library.login(&email, &password).await?;
            println!("Signed in as {} <{}>", grant.user.username, grant.user.email);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let grant = library.register(&username, &email, &password).await?;
            println!("Account created for {}", grant.user.username);
        }
        Command::Logout => {
            library.logout()?;
            println!("Signed out");
        }
        Command::Whoami => match state.session.user() {
            Some(user) => println!("{} <{}> ({})", user.username, user.email, user.id),
            None if state.session.is_authenticated() => println!("Signed in (no profile stored)"),
            None => println!("Not signed in"),
        },
        Command::List { search } => {
            let docs = match search {
                Some(query) => library.search_documents(&query).await?,
                None => library.list_documents().await?,
            };
            print_origin(&docs);
            if docs.value.is_empty() {
                println!("Your library is empty");
            }
            for doc in &docs.value {
                print_document(doc);
            }
        }
        Command::Show { id } => {
            let doc = library.get_document(&id).await?;
            print_origin(&doc);
            print_document(&doc.value);
            let notes = library.list_notes(&id).await?;
            for note in &notes.value {
                print_note(note);
            }
        }
        Command::Upload { path } => {
            let bytes = tokio::fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime = if name.to_lowercase().ends_with(".pdf") {
                PDF_MIME_TYPE
            } else {
                "application/octet-stream"
            };
            let doc = library.upload_document(UploadFile::new(name, mime, bytes)).await?;
            print_origin(&doc);
            if let Some(last) = library.take_last_upload()? {
                println!("{} has been added to your library ({} bytes)", last.name, last.size);
            }
            print_document(&doc.value);
        }
        Command::Delete { id } => {
            let done = library.delete_document(&id).await?;
            print_origin(&done);
            println!("Document {} removed from your library", id);
        }
        Command::Notes { document_id } => {
            let notes = library.list_notes(&document_id).await?;
            print_origin(&notes);
            if notes.value.is_empty() {
                println!("No notes yet");
            }
            for note in &notes.value {
                print_note(note);
            }
        }
        Command::Note { action } => match action {
            NoteAction::Add {
                document_id,
                content,
            } => {
                let note = library.create_note(&document_id, &content).await?;
                print_origin(&note);
                print_note(&note.value);
            }
            NoteAction::Edit { note_id, content } => {
                let note = library.update_note(&note_id, &content).await?;
                print_origin(&note);
                print_note(&note.value);
            }
            NoteAction::Rm { note_id } => {
                let done = library.delete_note(&note_id).await?;
                print_origin(&done);
                println!("Note {} deleted", note_id);
            }
        },
        Command::Sync { watch } => {
            let report = state.reconciler.run_once().await?;
            println!(
                "Replayed {}, skipped {} obsolete, dropped {}, {} still queued",
                report.replayed, report.obsolete, report.dropped, report.remaining
            );
            if watch {
                let cancel = CancellationToken::new();
                let handle = state.start_background_sync(cancel.clone());
                if handle.is_none() {
                    println!("Background sync is disabled (SYNC_INTERVAL_SECS=0)");
                    return Ok(());
                }
                tokio::signal::ctrl_c().await?;
                cancel.cancel();
                if let Some(handle) = handle {
                    handle
                        .await
                        .map_err(|e| ClientError::Internal(e.to_string()))?;
                }
            }
        }
        Command::Status => {
            match state.session.user() {
                Some(user) => println!("Signed in as {}", user.email),
                None => println!("Not signed in"),
            }
            let pending = library.pending_mutations()?;
            println!("{} change(s) waiting for the backend", pending.len());
            for item in pending {
                let error = item.last_error.unwrap_or_default();
                println!("  {:?} (attempts: {}) {}", item.mutation, item.attempts, error);
            }
        }
    }
    Ok(())
}

fn print_origin<T>(synced: &Synced<T>) {
    if synced.state == SyncState::PersistedLocal {
        println!("(offline: showing locally stored data)");
    }
}

fn print_document(doc: &Document) {
    println!(
        "{:>14}  {}  [{}]  {}",
        doc.id,
        doc.upload_date.with_timezone(&Local).format("%b %e %Y"),
        doc.filename,
        doc.title
    );
}

fn print_note(note: &Note) {
    let (label, at) = if note.is_edited() {
        ("Updated", note.updated_at)
    } else {
        ("Created", note.created_at)
    };
    println!(
        "- [{}] {} {}\n  {}",
        note.id,
        label,
        at.with_timezone(&Local).format("%b %e, %H:%M"),
        note.content
    );
}
