//! Process-wide settings store
//!
//! Two tunables live in the settings table: the number of alphabet letters a
//! new story covers and the submission halt flag. Reads never fail: a missing
//! row, a read error, or an undecodable value all fall back to the hardcoded
//! default for that key. Writes report success as a boolean.

use redb::{Database, ReadableDatabase};

use crate::database::TABLE_SETTINGS;
use crate::model::AppSettings;

pub const ALPHABET_LETTERS_COUNT: &str = "ALPHABET_LETTERS_COUNT";
pub const SUBMISSIONS_HALTED: &str = "SUBMISSIONS_HALTED";

pub const DEFAULT_LETTER_COUNT: u32 = 8;
pub const DEFAULT_SUBMISSIONS_HALTED: bool = false;

/// Raw read of a setting value; all failure modes collapse to `None`.
fn read_raw(db: &Database, key: &str) -> Option<serde_json::Value> {
    let read = || -> Result<Option<serde_json::Value>, redb::Error> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TABLE_SETTINGS)?;
        Ok(table
            .get(key)?
            .and_then(|guard| serde_json::from_str(guard.value()).ok()))
    };

    match read() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key, error = %err, "settings read failed, using default");
            None
        }
    }
}

/// Number of alphabet letters a newly submitted story covers, clamped to the
/// size of the alphabet.
pub fn letter_count(db: &Database) -> u32 {
    read_raw(db, ALPHABET_LETTERS_COUNT)
        .and_then(|value| value.as_u64())
        .map(|count| (count as u32).clamp(1, 26))
        .unwrap_or(DEFAULT_LETTER_COUNT)
}

/// Whether new story submissions are currently rejected.
pub fn submissions_halted(db: &Database) -> bool {
    read_raw(db, SUBMISSIONS_HALTED)
        .and_then(|value| value.as_bool())
        .unwrap_or(DEFAULT_SUBMISSIONS_HALTED)
}

/// Writes a setting value. Returns false instead of erroring on failure.
pub fn set_setting(db: &Database, key: &str, value: &serde_json::Value) -> bool {
    let write = || -> Result<(), redb::Error> {
        let value_json = value.to_string();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE_SETTINGS)?;
            table.insert(key, value_json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    };

    match write() {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(key, error = %err, "settings write failed");
            false
        }
    }
}

/// Reads every known setting, defaulting each one individually.
pub fn all_settings(db: &Database) -> AppSettings {
    AppSettings {
        alphabet_letters_count: letter_count(db),
        submissions_halted: submissions_halted(db),
    }
}
