//! Route definitions for the storybook API
//!
//! This module configures all HTTP routes and maps them to their respective
//! handlers. Admin routes live under `/api/admin` behind the shared-secret
//! middleware; the cleanup trigger authenticates itself with its own secret.

use axum::routing::{delete, get, patch, post};
use axum::{middleware, Router};
use tower_http::services::ServeDir;

use crate::database::AppState;
use crate::handler::{
    cleanup, create_story, delete_story, get_all_settings, get_setting, get_story, list_stories,
    set_setting, update_visibility,
};
use crate::middleware::admin_auth;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `POST /api/stories` - Submit a story; generation runs in the background
/// - `GET /api/stories` - Public listing (admins may include unlisted)
/// - `GET /api/stories/{id}` - Poll one story's progress
/// - `GET /api/settings` / `GET /api/settings/all` - Read settings
/// - `GET /api/cron/cleanup` - Timeout sweeper (cron secret)
/// - `DELETE /api/admin/stories/{id}` - Delete a story (admin)
/// - `PATCH /api/admin/stories/{id}/visibility` - Toggle visibility (admin)
/// - `POST /api/admin/settings` - Update a setting (admin)
/// - `GET /media/...` - Generated images, when file-backed storage is used
pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/stories/{id}", delete(delete_story))
        .route("/stories/{id}/visibility", patch(update_visibility))
        .route("/settings", post(set_setting))
        .layer(middleware::from_fn(admin_auth));

    let api_routes = Router::new()
        .route("/stories", get(list_stories).post(create_story))
        .route("/stories/{id}", get(get_story))
        .route("/settings", get(get_setting))
        .route("/settings/all", get(get_all_settings))
        .route("/cron/cleanup", get(cleanup))
        .nest("/admin", admin_routes);

    let mut app = Router::new().nest("/api", api_routes);

    if let Some(media_dir) = &state.media_dir {
        app = app.nest_service("/media", ServeDir::new(media_dir));
    }

    app.with_state(state)
}
