//! Data models for the alphabet storybook application
//!
//! This module defines the story record stored in the database, the status
//! state machine that drives generation, and the request/response models used
//! by the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The full alphabet; stories use the first N letters.
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Theme used when the submission carries no prompt.
pub const DEFAULT_PROMPT: &str = "A fun alphabet adventure for children";

/// Age range used when the submission carries none.
pub const DEFAULT_AGE_RANGE: &str = "3-8";

/// Returns the first `count` letters of the alphabet, in order.
pub fn alphabet_subset(count: u32) -> Vec<char> {
    ALPHABET.chars().take(count as usize).collect()
}

/// Generation lifecycle of a story.
///
/// Statuses only move forward (`Generating -> GeneratingStory ->
/// GeneratingImages -> Complete`) or jump to `Failed` from any non-terminal
/// state. `Complete` and `Failed` are terminal: no further status change is
/// accepted by the store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Generating,
    GeneratingStory,
    GeneratingImages,
    Complete,
    Failed,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Generating => "generating",
            StoryStatus::GeneratingStory => "generating_story",
            StoryStatus::GeneratingImages => "generating_images",
            StoryStatus::Complete => "complete",
            StoryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Complete | StoryStatus::Failed)
    }

    /// Position in the forward progression.
    fn rank(&self) -> u8 {
        match self {
            StoryStatus::Generating => 0,
            StoryStatus::GeneratingStory => 1,
            StoryStatus::GeneratingImages => 2,
            StoryStatus::Complete => 3,
            StoryStatus::Failed => 4,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: StoryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == StoryStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can see a story in the public listing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
}

/// A story record as stored in the database.
///
/// `story_content` and `images` hold JSON serialized within a string field so
/// the record round-trips through the KV store unchanged; readers parse them
/// tolerantly and treat malformed values as absent. `deletion_token` is
/// generated at creation and must never be returned to unauthenticated
/// readers.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub age: String,
    pub visibility: Visibility,
    pub status: StoryStatus,
    #[serde(default)]
    pub story_content: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub deletion_token: String,
}

impl StoryRecord {
    /// Parses the serialized narrative, treating malformed content as absent.
    pub fn content(&self) -> Option<StoryContent> {
        self.story_content
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Parses the serialized image list, treating malformed content as empty.
    pub fn image_urls(&self) -> Vec<String> {
        self.images
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn preview_image(&self) -> Option<String> {
        self.image_urls().into_iter().next()
    }
}

/// The structured narrative produced by the text model.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoryContent {
    pub title: String,
    pub pages: Vec<StoryPage>,
    pub moral: String,
}

/// One page of the narrative: the text shown to the reader and the prompt
/// handed to the image model for this page's illustration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    pub text: String,
    pub image_prompt: String,
}

/// Request payload for submitting a new story.
#[derive(Deserialize, Debug)]
pub struct CreateStoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// Response returned after a story submission is accepted.
#[derive(Serialize, Debug)]
pub struct CreateStoryResponse {
    pub id: String,
    pub status: StoryStatus,
}

/// A story as returned to polling readers: the full record minus the
/// deletion token.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub age: String,
    pub visibility: Visibility,
    pub status: StoryStatus,
    pub story_content: Option<String>,
    pub images: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<StoryRecord> for StoryView {
    fn from(record: StoryRecord) -> Self {
        StoryView {
            id: record.id,
            title: record.title,
            prompt: record.prompt,
            age: record.age,
            visibility: record.visibility,
            status: record.status,
            story_content: record.story_content,
            images: record.images,
            error: record.error,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

/// A listing entry: record metadata plus a preview image, without the bulky
/// serialized content fields or the deletion token.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub age: String,
    pub visibility: Visibility,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub preview_image: Option<String>,
}

impl From<&StoryRecord> for StorySummary {
    fn from(record: &StoryRecord) -> Self {
        StorySummary {
            id: record.id.clone(),
            title: record.title.clone(),
            prompt: record.prompt.clone(),
            age: record.age.clone(),
            visibility: record.visibility,
            status: record.status,
            created_at: record.created_at,
            completed_at: record.completed_at,
            preview_image: record.preview_image(),
        }
    }
}

/// Query parameters for the story listing endpoint.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub include_unlisted: bool,
}

/// Request payload for the admin visibility toggle.
#[derive(Deserialize, Debug)]
pub struct UpdateVisibilityRequest {
    pub visibility: Visibility,
}

/// Partial update applied to a story record.
///
/// Only the fields that are `Some` are merged into the stored record; the
/// store applies the merge atomically inside a single write transaction.
#[derive(Debug, Default, Clone)]
pub struct StoryPatch {
    pub status: Option<StoryStatus>,
    pub story_content: Option<String>,
    pub images: Option<String>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub visibility: Option<Visibility>,
}

/// The tunable application settings with their effective values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    #[serde(rename = "ALPHABET_LETTERS_COUNT")]
    pub alphabet_letters_count: u32,
    #[serde(rename = "SUBMISSIONS_HALTED")]
    pub submissions_halted: bool,
}
