//! Database initialization and table definitions
//!
//! This module handles the setup and configuration of the embedded redb
//! database. It defines the database tables and the application state shared
//! across request handlers.

use redb::{Database, TableDefinition};
use std::path::PathBuf;
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::image_gen::Illustrator;
use crate::text_gen::TextModel;

/// Main table for story records
///
/// Key: story id (UUID string)
/// Value: JSON-serialized StoryRecord as string
pub const TABLE_STORIES: TableDefinition<&str, &str> = TableDefinition::new("stories_v1");

/// Index table for chronological listing
///
/// Key: composite key in format "{created_at_micros:020}:{story_id}"
/// Value: story id
///
/// The zero-padded timestamp keeps lexicographic order equal to creation
/// order, so walking the table in reverse yields newest-first listings.
/// Entries are written at creation and removed at deletion; they never
/// change, since `created_at` is immutable.
pub const TABLE_STORY_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("story_index_v1");

/// Settings table
///
/// Key: setting name (e.g. "ALPHABET_LETTERS_COUNT")
/// Value: JSON-serialized setting value
pub const TABLE_SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings_v1");

/// Application state shared across all request handlers
///
/// The database is the only shared mutable resource; the model clients and
/// blob store sit behind traits so tests can inject fakes.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,
    /// Text generation client used by the pipeline
    pub text_model: Arc<dyn TextModel>,
    /// Image generation client wrapped with placeholder degradation
    pub illustrator: Arc<Illustrator>,
    /// Durable storage for generated image bytes
    pub blobs: Arc<dyn BlobStore>,
    /// Local directory served at /media, when blob storage is file-backed
    pub media_dir: Option<PathBuf>,
}

/// Initializes the embedded database and creates required tables
///
/// Creates or opens the database file at the specified path, opens every
/// table, and commits the transaction so the table structures are persisted.
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_STORIES)?;
        write_txn.open_table(TABLE_STORY_INDEX)?;
        write_txn.open_table(TABLE_SETTINGS)?;
    }
    write_txn.commit()?;

    Ok(db)
}
