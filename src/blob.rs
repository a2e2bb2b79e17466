//! Blob storage for generated images
//!
//! The pipeline only needs two operations: upload the bytes for one page and
//! drop everything belonging to a story. The filesystem implementation writes
//! under a media root that the router serves read-only at `/media`.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores image bytes keyed by `(story_id, page_index)` and returns the
    /// durable URL they will be served from.
    async fn upload(
        &self,
        data: &[u8],
        mime_type: &str,
        story_id: &str,
        page_index: usize,
    ) -> Result<String, BlobError>;

    /// Removes every blob belonging to a story. Missing blobs are not an
    /// error.
    async fn delete_story_blobs(&self, story_id: &str) -> Result<(), BlobError>;
}

/// File-backed blob store
///
/// Layout: `{root}/{story_id}/page-{index}.{ext}`, served as
/// `{public_base}/media/{story_id}/page-{index}.{ext}`.
pub struct FsBlobStore {
    root: PathBuf,
    public_base: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        let public_base: String = public_base.into();
        FsBlobStore {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        // Gemini image output defaults to PNG
        _ => "png",
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        data: &[u8],
        mime_type: &str,
        story_id: &str,
        page_index: usize,
    ) -> Result<String, BlobError> {
        let dir = self.root.join(story_id);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("page-{}.{}", page_index, extension_for(mime_type));
        tokio::fs::write(dir.join(&file_name), data).await?;

        Ok(format!(
            "{}/media/{}/{}",
            self.public_base, story_id, file_name
        ))
    }

    async fn delete_story_blobs(&self, story_id: &str) -> Result<(), BlobError> {
        match tokio::fs::remove_dir_all(self.root.join(story_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
