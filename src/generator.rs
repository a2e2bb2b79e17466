//! Story generation pipeline
//!
//! Runs as a detached task spawned by the submission handler, never awaited
//! by the request path. The record in the store is the only channel back to
//! the client: status transitions and the growing image list are persisted
//! after every step so a polling reader observes monotonic progress, and a
//! process death mid-job simply leaves the record non-terminal for the
//! timeout sweeper.

use std::collections::VecDeque;

use crate::database::AppState;
use crate::error::AppError;
use crate::image_gen::{is_placeholder, SeedImage, CONTEXT_SEED_LIMIT};
use crate::model::{alphabet_subset, StoryPatch, StoryStatus};
use crate::store;
use crate::text_gen::NarrativeRequest;

/// Failure boundary for one generation job.
///
/// Invoked exactly once per story. Every error from the inner pipeline is
/// converted into a terminal `failed` status plus a human-readable message;
/// nothing escapes the spawned task.
pub async fn generate_story_in_background(
    state: AppState,
    story_id: String,
    title: String,
    prompt: String,
    age_range: String,
    letter_count: u32,
) {
    tracing::info!(story_id = %story_id, letter_count, "starting story generation");

    if let Err(err) = run_pipeline(&state, &story_id, &title, &prompt, &age_range, letter_count).await
    {
        tracing::error!(story_id = %story_id, error = %err, "story generation failed");
        let patch = StoryPatch {
            status: Some(StoryStatus::Failed),
            error: Some(err.to_string()),
            ..Default::default()
        };
        if let Err(update_err) = store::update_story(&state.db, &story_id, patch) {
            tracing::error!(
                story_id = %story_id,
                error = %update_err,
                "could not mark story as failed"
            );
        }
    } else {
        tracing::info!(story_id = %story_id, "story generation complete");
    }
}

async fn run_pipeline(
    state: &AppState,
    story_id: &str,
    title: &str,
    prompt: &str,
    age_range: &str,
    letter_count: u32,
) -> Result<(), AppError> {
    let letters = alphabet_subset(letter_count);

    store::update_story(
        &state.db,
        story_id,
        StoryPatch {
            status: Some(StoryStatus::GeneratingStory),
            ..Default::default()
        },
    )?;

    // Text stage: any failure here aborts the whole job, so partial story
    // content is never persisted.
    let narrative = state
        .text_model
        .generate_story(&NarrativeRequest {
            title: title.to_string(),
            theme: prompt.to_string(),
            age_range: age_range.to_string(),
            letter_count,
            letters: letters.clone(),
        })
        .await?;

    // Content and the status that makes it readable land in one update.
    let content_json = serde_json::to_string(&narrative)?;
    store::update_story(
        &state.db,
        story_id,
        StoryPatch {
            status: Some(StoryStatus::GeneratingImages),
            story_content: Some(content_json),
            ..Default::default()
        },
    )?;

    // Image stage: strictly sequential, one page at a time. The sliding
    // window carries the last three genuine successes as context; a degraded
    // page yields a placeholder URL and seeds nothing.
    let mut images: Vec<String> = Vec::with_capacity(narrative.pages.len());
    let mut window: VecDeque<SeedImage> = VecDeque::with_capacity(CONTEXT_SEED_LIMIT);

    for (page_index, page) in narrative.pages.iter().enumerate() {
        let seeds: Vec<SeedImage> = window.iter().cloned().collect();
        let illustration = state
            .illustrator
            .illustrate(&page.image_prompt, story_id, page_index, &seeds)
            .await;

        if is_placeholder(&illustration.url) {
            tracing::warn!(
                story_id,
                page_index,
                "page image degraded to placeholder"
            );
        }

        images.push(illustration.url);
        if let Some(seed) = illustration.seed {
            window.push_back(seed);
            if window.len() > CONTEXT_SEED_LIMIT {
                window.pop_front();
            }
        }

        // Checkpoint after every page so polling readers see progress. A
        // store failure here means the record can no longer be trusted and
        // aborts the job.
        store::update_story(
            &state.db,
            story_id,
            StoryPatch {
                images: Some(serde_json::to_string(&images)?),
                ..Default::default()
            },
        )?;
    }

    store::update_story(
        &state.db,
        story_id,
        StoryPatch {
            status: Some(StoryStatus::Complete),
            images: Some(serde_json::to_string(&images)?),
            completed_at: Some(chrono::Utc::now()),
            ..Default::default()
        },
    )?;

    Ok(())
}
