//! Persistence layer for story records
//!
//! CRUD over the stories table plus the chronological index. Records are
//! stored as JSON strings; `update_story` merges partial fields atomically
//! inside a single write transaction and enforces the status state machine,
//! so a record can never be observed mid-merge or after an illegal
//! transition.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};

use crate::database::{TABLE_STORIES, TABLE_STORY_INDEX};
use crate::error::AppError;
use crate::model::{StoryPatch, StoryRecord};

/// Composite index key: zero-padded creation micros, then the id for
/// uniqueness.
fn index_key(created_at: DateTime<Utc>, id: &str) -> String {
    format!("{:020}:{}", created_at.timestamp_micros(), id)
}

/// Inserts a new story record and its index entry.
///
/// Ids are UUIDs assigned by the caller; a collision is a conflict.
pub fn create_story(db: &Database, record: &StoryRecord) -> Result<(), AppError> {
    let record_json = serde_json::to_string(record)?;

    let write_txn = db.begin_write()?;
    {
        let mut stories = write_txn.open_table(TABLE_STORIES)?;
        if stories.get(record.id.as_str())?.is_some() {
            return Err(AppError::Conflict(format!(
                "story {} already exists",
                record.id
            )));
        }
        stories.insert(record.id.as_str(), record_json.as_str())?;

        let mut index = write_txn.open_table(TABLE_STORY_INDEX)?;
        let key = index_key(record.created_at, &record.id);
        index.insert(key.as_str(), record.id.as_str())?;
    }
    write_txn.commit()?;

    Ok(())
}

/// Fetches a story by id. Unparsable stored JSON is treated as absent, not
/// as an error.
pub fn get_story(db: &Database, id: &str) -> Result<Option<StoryRecord>, AppError> {
    let read_txn = db.begin_read()?;
    let stories = read_txn.open_table(TABLE_STORIES)?;

    let Some(guard) = stories.get(id)? else {
        return Ok(None);
    };

    match serde_json::from_str::<StoryRecord>(guard.value()) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            tracing::warn!(story_id = %id, error = %err, "skipping unparsable story record");
            Ok(None)
        }
    }
}

/// Applies a partial update to a story record.
///
/// The read-merge-write happens inside one write transaction. Status changes
/// must be legal under the state machine, and `story_content` is write-once;
/// violations are rejected as conflicts and leave the record untouched.
pub fn update_story(db: &Database, id: &str, patch: StoryPatch) -> Result<StoryRecord, AppError> {
    let write_txn = db.begin_write()?;
    let updated = {
        let mut stories = write_txn.open_table(TABLE_STORIES)?;

        let mut record = match stories.get(id)? {
            Some(guard) => serde_json::from_str::<StoryRecord>(guard.value())
                .map_err(|_| AppError::NotFound)?,
            None => return Err(AppError::NotFound),
        };

        if let Some(next) = patch.status {
            if !record.status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "illegal status transition: {} -> {}",
                    record.status, next
                )));
            }
            record.status = next;
        }
        if let Some(content) = patch.story_content {
            if record.story_content.is_some() {
                return Err(AppError::Conflict(
                    "story content is write-once".to_string(),
                ));
            }
            record.story_content = Some(content);
        }
        if let Some(images) = patch.images {
            record.images = Some(images);
        }
        if let Some(error) = patch.error {
            record.error = Some(error);
        }
        if let Some(completed_at) = patch.completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some(visibility) = patch.visibility {
            record.visibility = visibility;
        }

        let record_json = serde_json::to_string(&record)?;
        stories.insert(id, record_json.as_str())?;
        record
    };
    write_txn.commit()?;

    Ok(updated)
}

/// Removes a story record and its index entry.
pub fn delete_story(db: &Database, id: &str) -> Result<(), AppError> {
    let write_txn = db.begin_write()?;
    {
        let mut stories = write_txn.open_table(TABLE_STORIES)?;

        let record = match stories.remove(id)? {
            Some(guard) => serde_json::from_str::<StoryRecord>(guard.value()).ok(),
            None => return Err(AppError::NotFound),
        };

        let mut index = write_txn.open_table(TABLE_STORY_INDEX)?;
        if let Some(record) = record {
            let key = index_key(record.created_at, id);
            index.remove(key.as_str())?;
        } else {
            // Record JSON was unparsable; sweep the index for dangling
            // entries pointing at this id.
            let dangling: Vec<String> = index
                .iter()?
                .filter_map(|res| res.ok())
                .filter(|(_, value)| value.value() == id)
                .map(|(key, _)| key.value().to_string())
                .collect();
            for key in dangling {
                index.remove(key.as_str())?;
            }
        }
    }
    write_txn.commit()?;

    Ok(())
}

/// Lists all stories, newest first.
///
/// Walks the chronological index in reverse and resolves each entry against
/// the main table; dangling or unparsable entries are skipped.
pub fn list_stories(db: &Database) -> Result<Vec<StoryRecord>, AppError> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(TABLE_STORY_INDEX)?;
    let stories = read_txn.open_table(TABLE_STORIES)?;

    let mut records = Vec::new();
    for entry in index.iter()?.rev() {
        let (_, id_guard) = entry?;
        let id = id_guard.value();
        if let Some(guard) = stories.get(id)? {
            if let Ok(record) = serde_json::from_str::<StoryRecord>(guard.value()) {
                records.push(record);
            }
        }
    }

    Ok(records)
}
