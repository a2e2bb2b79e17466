//! HTTP request handlers for the storybook API
//!
//! This module implements the thin web layer over the core:
//! - Story submission, which enqueues the generation pipeline and returns
//!   immediately
//! - Polling reads for single stories and the public listing
//! - Admin moderation (delete, visibility) and settings tuning
//! - The authenticated cleanup trigger for the timeout sweeper

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::env;
use uuid::Uuid;

use crate::database::AppState;
use crate::error::AppError;
use crate::generator::generate_story_in_background;
use crate::middleware::is_admin;
use crate::model::{
    CreateStoryRequest, CreateStoryResponse, ListParams, StoryPatch, StoryRecord, StoryStatus,
    StorySummary, StoryView, UpdateVisibilityRequest, Visibility, DEFAULT_AGE_RANGE,
    DEFAULT_PROMPT,
};
use crate::settings;
use crate::store;
use crate::sweeper;

/// Secret stored alongside each story; no endpoint consumes it yet, but the
/// record invariant requires it to exist and to stay server-side.
fn deletion_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Submits a new story and enqueues its generation
///
/// The handler's responsibility ends at enqueueing: the record is created
/// with `status=generating`, the pipeline is spawned as a detached task, and
/// the response returns before any model call happens. Clients poll
/// `GET /api/stories/{id}` for progress.
///
/// The configured letter count is snapshotted here and passed into the
/// pipeline, so a settings change mid-generation cannot drift the page count
/// away from what the reader was promised.
pub async fn create_story(
    State(state): State<AppState>,
    Json(payload): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if settings::submissions_halted(&state.db) {
        return Err(AppError::Halted);
    }

    let title = non_empty(payload.title)
        .ok_or_else(|| AppError::BadRequest("Title is required".to_string()))?;
    let prompt = non_empty(payload.prompt).unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let age = non_empty(payload.age).unwrap_or_else(|| DEFAULT_AGE_RANGE.to_string());
    let visibility = payload.visibility.unwrap_or(Visibility::Public);

    let story_id = Uuid::new_v4().to_string();
    let record = StoryRecord {
        id: story_id.clone(),
        title: title.clone(),
        prompt: prompt.clone(),
        age: age.clone(),
        visibility,
        status: StoryStatus::Generating,
        story_content: None,
        images: None,
        error: None,
        created_at: Utc::now(),
        completed_at: None,
        deletion_token: deletion_token(),
    };
    store::create_story(&state.db, &record)?;

    let letter_count = settings::letter_count(&state.db);
    tokio::spawn(generate_story_in_background(
        state.clone(),
        story_id.clone(),
        title,
        prompt,
        age,
        letter_count,
    ));

    Ok((
        StatusCode::CREATED,
        Json(CreateStoryResponse {
            id: story_id,
            status: StoryStatus::Generating,
        }),
    ))
}

/// Returns one story for polling readers, minus the deletion token.
pub async fn get_story(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let record = store::get_story(&state.db, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(StoryView::from(record)))
}

/// Lists stories newest-first for the public index
///
/// Failed stories are always hidden; unlisted ones appear only for admins
/// asking for them explicitly.
pub async fn list_stories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if params.include_unlisted && !is_admin(&headers) {
        return Err(AppError::Forbidden(
            "Admin access required to view unlisted stories".to_string(),
        ));
    }

    let summaries: Vec<StorySummary> = store::list_stories(&state.db)?
        .iter()
        .filter(|record| record.status != StoryStatus::Failed)
        .filter(|record| params.include_unlisted || record.visibility != Visibility::Unlisted)
        .map(StorySummary::from)
        .collect();

    Ok(Json(json!({ "stories": summaries })))
}

/// Deletes a story and its stored images (admin)
///
/// Blob removal is best-effort: a record gone with blobs orphaned is an
/// acceptable failure mode.
pub async fn delete_story(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if store::get_story(&state.db, &id)?.is_none() {
        return Err(AppError::NotFound);
    }

    store::delete_story(&state.db, &id)?;
    if let Err(err) = state.blobs.delete_story_blobs(&id).await {
        tracing::warn!(story_id = %id, error = %err, "blob cleanup failed after delete");
    }

    Ok(Json(json!({
        "success": true,
        "message": "Story deleted successfully"
    })))
}

/// Toggles a story between public and unlisted (admin).
pub async fn update_visibility(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateVisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = store::update_story(
        &state.db,
        &id,
        StoryPatch {
            visibility: Some(payload.visibility),
            ..Default::default()
        },
    )?;

    Ok(Json(json!({
        "success": true,
        "story": StoryView::from(updated)
    })))
}

/// Query parameters for reading one setting.
#[derive(Deserialize)]
pub struct SettingParams {
    pub key: Option<String>,
}

/// Reads one setting; unknown keys are a bad request.
pub async fn get_setting(
    State(state): State<AppState>,
    Query(params): Query<SettingParams>,
) -> Result<impl IntoResponse, AppError> {
    let key = params
        .key
        .ok_or_else(|| AppError::BadRequest("Key parameter is required".to_string()))?;

    let value = match key.as_str() {
        settings::ALPHABET_LETTERS_COUNT => json!(settings::letter_count(&state.db)),
        settings::SUBMISSIONS_HALTED => json!(settings::submissions_halted(&state.db)),
        other => {
            return Err(AppError::BadRequest(format!("Unknown setting: {}", other)));
        }
    };

    Ok(Json(json!({ "key": key, "value": value })))
}

/// Reads every setting with per-key defaulting.
pub async fn get_all_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(settings::all_settings(&state.db))
}

/// Request payload for updating a setting (admin).
#[derive(Deserialize)]
pub struct UpdateSettingRequest {
    pub key: String,
    pub value: serde_json::Value,
}

/// Updates one setting (admin); values are validated per key.
pub async fn set_setting(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingRequest>,
) -> Result<impl IntoResponse, AppError> {
    match payload.key.as_str() {
        settings::ALPHABET_LETTERS_COUNT => {
            let count = payload
                .value
                .as_u64()
                .filter(|count| (1..=26).contains(count))
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "ALPHABET_LETTERS_COUNT must be an integer between 1 and 26".to_string(),
                    )
                })?;
            if !settings::set_setting(&state.db, &payload.key, &json!(count)) {
                return Err(AppError::Internal("Failed to update setting".to_string()));
            }
        }
        settings::SUBMISSIONS_HALTED => {
            let halted = payload.value.as_bool().ok_or_else(|| {
                AppError::BadRequest("SUBMISSIONS_HALTED must be a boolean".to_string())
            })?;
            if !settings::set_setting(&state.db, &payload.key, &json!(halted)) {
                return Err(AppError::Internal("Failed to update setting".to_string()));
            }
        }
        other => {
            return Err(AppError::BadRequest(format!("Unknown setting: {}", other)));
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": "Setting updated successfully",
        "key": payload.key,
        "value": payload.value
    })))
}

/// Query parameters for the cleanup trigger.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupParams {
    pub cron_secret: Option<String>,
}

/// Externally triggered sweep of timed-out stories
///
/// Authenticated by its own shared secret (`CRON_SECRET`), separate from the
/// admin password, so a scheduler credential cannot touch the admin surface.
pub async fn cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<impl IntoResponse, AppError> {
    let expected = env::var("CRON_SECRET").unwrap_or_default();
    let provided = params.cron_secret.unwrap_or_default();

    if expected.is_empty() || provided != expected {
        tracing::error!("unauthorized access attempt to cleanup cron job");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }

    let report = sweeper::sweep(&state, Utc::now()).await?;
    Ok(Json(report))
}
