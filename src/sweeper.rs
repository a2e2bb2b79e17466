//! Timeout sweeper for stuck stories
//!
//! A story that is neither complete nor failed after 24 hours is considered
//! abandoned (the process running its pipeline died, or the job hung) and is
//! deleted together with its blobs. Deletion is best-effort per story: one
//! failure is recorded in the report and does not stop the rest.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::AppState;
use crate::error::AppError;
use crate::model::{StoryRecord, StoryStatus};
use crate::store;

pub const TIMEOUT_HOURS: i64 = 24;

/// Whether a story is stuck: non-terminal and older than the timeout.
pub fn is_timed_out(record: &StoryRecord, now: DateTime<Utc>) -> bool {
    if record.status.is_terminal() {
        return false;
    }
    now - record.created_at > chrono::Duration::hours(TIMEOUT_HOURS)
}

/// Outcome of one attempted deletion.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub id: String,
    pub title: String,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary returned by a sweep run.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub message: String,
    pub total_processed: usize,
    pub results: Vec<SweepOutcome>,
}

/// Scans all stories and deletes the stuck ones.
///
/// Errors only when the story list itself cannot be read; per-story deletion
/// failures are recorded in the report.
pub async fn sweep(state: &AppState, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
    tracing::info!("starting cleanup of timed out stories");

    let stories = store::list_stories(&state.db)?;
    if stories.is_empty() {
        return Ok(SweepReport {
            message: "No stories to clean up".to_string(),
            total_processed: 0,
            results: Vec::new(),
        });
    }

    let timed_out: Vec<StoryRecord> = stories
        .into_iter()
        .filter(|record| is_timed_out(record, now))
        .collect();

    if timed_out.is_empty() {
        return Ok(SweepReport {
            message: "No timed out stories found".to_string(),
            total_processed: 0,
            results: Vec::new(),
        });
    }

    tracing::info!(count = timed_out.len(), "found timed out stories to clean up");

    let mut results = Vec::with_capacity(timed_out.len());
    for record in &timed_out {
        match store::delete_story(&state.db, &record.id) {
            Ok(()) => {
                // Orphaned blobs are an acceptable failure mode; log and
                // move on.
                if let Err(err) = state.blobs.delete_story_blobs(&record.id).await {
                    tracing::warn!(story_id = %record.id, error = %err, "blob cleanup failed");
                }
                tracing::info!(story_id = %record.id, title = %record.title, "deleted timed out story");
                results.push(SweepOutcome {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    status: record.status,
                    created_at: record.created_at,
                    result: "deleted",
                    error: None,
                });
            }
            Err(err) => {
                tracing::error!(story_id = %record.id, error = %err, "error deleting story");
                results.push(SweepOutcome {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    status: record.status,
                    created_at: record.created_at,
                    result: "error",
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let deleted = results.iter().filter(|r| r.result == "deleted").count();
    Ok(SweepReport {
        message: format!("Cleaned up {} timed out stories", deleted),
        total_processed: timed_out.len(),
        results,
    })
}
