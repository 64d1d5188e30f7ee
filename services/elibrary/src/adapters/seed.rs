//! services/elibrary/src/adapters/seed.rs
//!
//! Implementations of the `SeedProvider` port.

use chrono::{DateTime, Duration, Utc};
use elibrary_core::domain::{Document, Note};
use elibrary_core::ports::SeedProvider;

pub const DEMO_OWNER: &str = "demo-user";

/// The fixed demonstration dataset: three documents, two notes per document.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoSeed;

const DEMO_DOCUMENTS: [(&str, &str, &str, i64); 3] = [
    ("1", "Introduction to Machine Learning", "ml-introduction.pdf", 0),
    ("2", "React Development Guide", "react-guide.pdf", 1),
    ("3", "Database Design Principles", "database-design.pdf", 7),
];

const DEMO_NOTES: [(&str, i64); 2] = [
    ("Key ideas from the first chapter are worth revisiting.", 1),
    ("Check the summary section before the next reading session.", 2),
];

impl SeedProvider for DemoSeed {
    fn documents(&self, now: DateTime<Utc>) -> Vec<Document> {
        DEMO_DOCUMENTS
            .iter()
            .map(|(id, title, filename, days_ago)| Document {
                id: id.to_string(),
                title: title.to_string(),
                filename: filename.to_string(),
                upload_date: now - Duration::days(*days_ago),
                owner_id: DEMO_OWNER.to_string(),
            })
            .collect()
    }

    fn notes(&self, document_id: &str, now: DateTime<Utc>) -> Vec<Note> {
        DEMO_NOTES
            .iter()
            .enumerate()
            .map(|(i, (content, hours_ago))| {
                let at = now - Duration::hours(*hours_ago);
                Note {
                    id: format!("{}-sample-{}", document_id, i + 1),
                    content: content.to_string(),
                    created_at: at,
                    updated_at: at,
                    document_id: document_id.to_string(),
                    owner_id: DEMO_OWNER.to_string(),
                }
            })
            .collect()
    }

    fn placeholder_document(&self, id: &str, now: DateTime<Utc>) -> Option<Document> {
        Some(Document {
            id: id.to_string(),
            title: "Sample Document".to_string(),
            filename: "sample.pdf".to_string(),
            upload_date: now,
            owner_id: DEMO_OWNER.to_string(),
        })
    }
}

/// Seeds nothing. Used for production data directories and most tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSeed;

impl SeedProvider for NoSeed {
    fn documents(&self, _now: DateTime<Utc>) -> Vec<Document> {
        Vec::new()
    }

    fn notes(&self, _document_id: &str, _now: DateTime<Utc>) -> Vec<Note> {
        Vec::new()
    }

    fn placeholder_document(&self, _id: &str, _now: DateTime<Utc>) -> Option<Document> {
        None
    }
}
