//! Integration tests for the storybook API
//!
//! These tests exercise the whole stack through the router: submission and
//! background generation, polling, listing rules, the admin surface, and the
//! settings endpoints. Model calls are served by in-process stubs.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use storybook::blob::{BlobError, BlobStore};
use storybook::database::{init_db, AppState};
use storybook::gemini::ModelError;
use storybook::image_gen::{ImageData, ImageModel, ImageRequest, Illustrator};
use storybook::model::{StoryContent, StoryPage, StoryRecord, StoryStatus, Visibility};
use storybook::route::create_app;
use storybook::settings;
use storybook::store;
use storybook::text_gen::{NarrativeRequest, TextModel};

// Mutex to ensure tests that modify env vars don't run in parallel
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ADMIN_HEADER: &str = "x-admin-password";

struct StubTextModel;

#[async_trait]
impl TextModel for StubTextModel {
    async fn generate_story(&self, request: &NarrativeRequest) -> Result<StoryContent, ModelError> {
        Ok(StoryContent {
            title: request.title.clone(),
            pages: request
                .letters
                .iter()
                .map(|letter| StoryPage {
                    text: format!("{}nother page of the adventure", letter),
                    image_prompt: format!("Scene for letter {}", letter),
                })
                .collect(),
            moral: "Sharing makes the sea brighter.".to_string(),
        })
    }
}

struct StubImageModel;

#[async_trait]
impl ImageModel for StubImageModel {
    async fn generate_image(&self, _request: &ImageRequest) -> Result<ImageData, ModelError> {
        Ok(ImageData {
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        })
    }
}

#[derive(Default)]
struct MemoryBlobStore {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        _data: &[u8],
        _mime_type: &str,
        story_id: &str,
        page_index: usize,
    ) -> Result<String, BlobError> {
        Ok(format!(
            "https://blobs.test/{}/page-{}.png",
            story_id, page_index
        ))
    }

    async fn delete_story_blobs(&self, story_id: &str) -> Result<(), BlobError> {
        self.deleted.lock().unwrap().push(story_id.to_string());
        Ok(())
    }
}

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> (axum::Router, AppState, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db = init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database");
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::default());

    let state = AppState {
        db: Arc::new(db),
        text_model: Arc::new(StubTextModel),
        illustrator: Arc::new(Illustrator::new(Arc::new(StubImageModel), blobs.clone())),
        blobs,
        media_dir: None,
    };

    (create_app(state.clone()), state, temp_db)
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

fn insert_story(
    state: &AppState,
    id: &str,
    status: StoryStatus,
    visibility: Visibility,
    images: Option<&str>,
) {
    let record = StoryRecord {
        id: id.to_string(),
        title: format!("Story {}", id),
        prompt: "a theme".to_string(),
        age: "3-8".to_string(),
        visibility,
        status,
        story_content: None,
        images: images.map(|s| s.to_string()),
        error: None,
        created_at: Utc::now(),
        completed_at: None,
        deletion_token: "secret-token".to_string(),
    };
    store::create_story(&state.db, &record).expect("insert story");
}

/// Polls the story endpoint until it reaches a terminal status.
async fn poll_until_terminal(app: &axum::Router, id: &str) -> Value {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/stories/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response.into_body()).await;
        let status = body["status"].as_str().unwrap_or_default().to_string();
        if status == "complete" || status == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("story {} never reached a terminal status", id);
}

#[tokio::test]
async fn test_submit_story_end_to_end() {
    let (app, state, _temp_db) = setup_test_app();

    settings::set_setting(&state.db, settings::ALPHABET_LETTERS_COUNT, &json!(3));

    let payload = json!({
        "title": "Ocean Friends",
        "prompt": "sea creatures helping each other",
        "age": "3-8"
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stories")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["status"], "generating");
    let id = body["id"].as_str().unwrap().to_string();

    let story = poll_until_terminal(&app, &id).await;
    assert_eq!(story["status"], "complete");

    // The deletion token never leaves the server.
    assert!(story.get("deletionToken").is_none());

    // storyContent and images round-trip as JSON serialized within a string.
    let content: Value =
        serde_json::from_str(story["storyContent"].as_str().unwrap()).unwrap();
    let pages = content["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 3);
    for (page, letter) in pages.iter().zip(["A", "B", "C"]) {
        assert!(page["text"].as_str().unwrap().starts_with(letter));
    }

    let images: Vec<String> =
        serde_json::from_str(story["images"].as_str().unwrap()).unwrap();
    assert_eq!(images.len(), 3);
    for image in &images {
        assert!(image.starts_with("https://blobs.test/"));
    }

    let created_at: DateTime<Utc> =
        story["createdAt"].as_str().unwrap().parse().unwrap();
    let completed_at: DateTime<Utc> =
        story["completedAt"].as_str().unwrap().parse().unwrap();
    assert!(completed_at >= created_at);
}

#[tokio::test]
async fn test_submit_story_requires_title() {
    let (app, _state, _temp_db) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stories")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "prompt": "no title" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submissions_can_be_halted() {
    let (app, state, _temp_db) = setup_test_app();

    settings::set_setting(&state.db, settings::SUBMISSIONS_HALTED, &json!(true));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stories")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "title": "Halted" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_get_story_not_found() {
    let (app, _state, _temp_db) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/stories/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing_hides_failed_and_unlisted_stories() {
    let _guard = ENV_MUTEX.lock().unwrap();
    env::set_var("ADMIN_PASSWORD", "listing_secret");

    let (app, state, _temp_db) = setup_test_app();

    insert_story(
        &state,
        "public1",
        StoryStatus::Complete,
        Visibility::Public,
        Some(r#"["https://blobs.test/public1/page-0.png"]"#),
    );
    insert_story(&state, "hidden1", StoryStatus::Complete, Visibility::Unlisted, None);
    insert_story(&state, "broken1", StoryStatus::Failed, Visibility::Public, None);

    // Public view: only the public, non-failed story.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/stories")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    let stories = body["stories"].as_array().unwrap();
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0]["id"], "public1");
    assert_eq!(
        stories[0]["previewImage"],
        "https://blobs.test/public1/page-0.png"
    );
    assert!(stories[0].get("deletionToken").is_none());
    assert!(stories[0].get("storyContent").is_none());

    // Unlisted requires admin.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/stories?includeUnlisted=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/stories?includeUnlisted=true")
                .header(ADMIN_HEADER, "listing_secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["stories"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_delete_story() {
    let _guard = ENV_MUTEX.lock().unwrap();
    env::set_var("ADMIN_PASSWORD", "delete_secret");

    let (app, state, _temp_db) = setup_test_app();
    insert_story(&state, "doomed", StoryStatus::Complete, Visibility::Public, None);

    // Without the secret, nothing happens.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/stories/doomed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(store::get_story(&state.db, "doomed").unwrap().is_some());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/stories/doomed")
                .header(ADMIN_HEADER, "delete_secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store::get_story(&state.db, "doomed").unwrap().is_none());

    // Deleting again reports not found.
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/stories/doomed")
                .header(ADMIN_HEADER, "delete_secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_visibility_toggle() {
    let _guard = ENV_MUTEX.lock().unwrap();
    env::set_var("ADMIN_PASSWORD", "toggle_secret");

    let (app, state, _temp_db) = setup_test_app();
    insert_story(&state, "toggle1", StoryStatus::Complete, Visibility::Public, None);

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/admin/stories/toggle1/visibility")
                .header("content-type", "application/json")
                .header(ADMIN_HEADER, "toggle_secret")
                .body(Body::from(json!({ "visibility": "unlisted" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["story"]["visibility"], "unlisted");

    let stored = store::get_story(&state.db, "toggle1").unwrap().unwrap();
    assert_eq!(stored.visibility, Visibility::Unlisted);
}

#[tokio::test]
async fn test_settings_endpoints() {
    let _guard = ENV_MUTEX.lock().unwrap();
    env::set_var("ADMIN_PASSWORD", "settings_secret");

    let (app, _state, _temp_db) = setup_test_app();

    // Defaults are served before anything is written.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/settings?key=ALPHABET_LETTERS_COUNT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["value"], 8);

    // Unknown keys are rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/settings?key=NO_SUCH_KEY")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Admin update, then read back.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/settings")
                .header("content-type", "application/json")
                .header(ADMIN_HEADER, "settings_secret")
                .body(Body::from(
                    json!({ "key": "ALPHABET_LETTERS_COUNT", "value": 5 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Out-of-range values are rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/settings")
                .header("content-type", "application/json")
                .header(ADMIN_HEADER, "settings_secret")
                .body(Body::from(
                    json!({ "key": "ALPHABET_LETTERS_COUNT", "value": 99 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // getAll is idempotent between writes.
    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/settings/all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        snapshots.push(response_json(response.into_body()).await);
    }
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[0]["ALPHABET_LETTERS_COUNT"], 5);
    assert_eq!(snapshots[0]["SUBMISSIONS_HALTED"], false);
}
