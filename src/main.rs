//! Application entry point and server initialization
//!
//! Loads environment configuration, initializes the embedded database,
//! assembles the Gemini clients and file-backed blob store, and starts the
//! HTTP server with graceful shutdown support.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use storybook::blob::FsBlobStore;
use storybook::database::{init_db, AppState};
use storybook::image_gen::{GeminiImageModel, Illustrator};
use storybook::route::create_app;
use storybook::text_gen::GeminiTextModel;

/// Per-request timeout for model calls. Expiry surfaces as a transport error
/// through the normal failure paths: whole-job failure for the text stage,
/// placeholder substitution for a page image.
const MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// # Environment Variables
///
/// - `PORT` - Server port number (default: 8080)
/// - `DATABASE_URL` - Path to database file (default: "data.db")
/// - `URL` - Public base URL used in image references (default: "http://localhost")
/// - `MEDIA_DIR` - Directory for generated images (default: "media")
/// - `GEMINI_API_KEY` - Model provider credential
/// - `GEMINI_TEXT_MODEL` / `GEMINI_IMAGE_MODEL` - Model overrides
/// - `ADMIN_PASSWORD` - Shared secret for the admin surface
/// - `CRON_SECRET` - Shared secret for the cleanup trigger
#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter("storybook=debug,tower_http=debug")
        .init();

    let port_str = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let port: u16 = port_str.parse().unwrap_or(8080);

    let db_name = env::var("DATABASE_URL").unwrap_or_else(|_| "data.db".to_string());
    let base_url = env::var("URL").unwrap_or_else(|_| "http://localhost".to_string());
    let public_base = format!("{}:{}", base_url, port);
    let media_dir = env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string());

    let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set; story generation will fail");
    }
    let text_model =
        env::var("GEMINI_TEXT_MODEL").unwrap_or_else(|_| "gemini-2.0-flash-lite".to_string());
    let image_model =
        env::var("GEMINI_IMAGE_MODEL").unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string());

    let db = init_db(&db_name).expect("Failed to initialize database");

    let http = reqwest::Client::builder()
        .timeout(MODEL_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client");

    let blobs = Arc::new(FsBlobStore::new(&media_dir, public_base));
    let gemini_images = Arc::new(GeminiImageModel::new(
        http.clone(),
        api_key.clone(),
        image_model,
    ));

    let state = AppState {
        db: Arc::new(db),
        text_model: Arc::new(GeminiTextModel::new(http, api_key, text_model)),
        illustrator: Arc::new(Illustrator::new(gemini_images, blobs.clone())),
        blobs,
        media_dir: Some(media_dir.clone().into()),
    };

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.unwrap();

    println!("🚀 Server running at http://localhost:{}", port);
    println!("📂 Using database: {}", db_name);
    println!("🖼  Serving media from: {}", media_dir);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

/// Handles graceful shutdown signals (SIGINT and SIGTERM)
///
/// Returning from this function triggers server shutdown: open connections
/// are allowed to complete and the database is closed cleanly. In-flight
/// generation jobs are abandoned; their records stay non-terminal and are
/// reclaimed by the timeout sweeper.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    println!("\n🛑 Shutdown signal received, stopping server.");
}
