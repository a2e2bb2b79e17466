//! Image generation client
//!
//! The Gemini client produces raw image bytes; the `Illustrator` wrapper
//! turns them into a durable hosted URL and degrades every failure mode to a
//! deterministic placeholder instead of erroring. Only genuine successes
//! yield a context seed for follow-up calls, which is how visual consistency
//! is threaded through a story's pages.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::blob::{BlobError, BlobStore};
use crate::gemini::{generate_content, ModelError};

/// At most this many prior images seed a request's context.
pub const CONTEXT_SEED_LIMIT: usize = 3;

/// A previously generated image carried forward for style continuity. Seeds
/// keep the raw bytes so follow-up requests can inline them without
/// refetching from blob storage.
#[derive(Debug, Clone)]
pub struct SeedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub prompt: String,
}

/// One image generation request: the page's prompt plus up to three prior
/// (image, prompt) pairs, oldest first.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub seeds: Vec<SeedImage>,
}

/// Raw image payload returned by a model.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageData, ModelError>;
}

/// The consistency clause only makes sense once prior images exist; the
/// first page gets the context-free variant.
fn illustration_prompt(prompt: &str, has_context: bool) -> String {
    if has_context {
        format!(
            "Generate an illustration for a children's ABC story: {}. Make it colorful, \
             child-friendly, and in a consistent style with any previous images. Include \
             diverse characters with different ethnicities, genders, and abilities. Ensure \
             representation is natural and authentic.",
            prompt
        )
    } else {
        format!(
            "Generate an illustration for a children's ABC story: {}. Make it colorful, \
             child-friendly, and include diverse characters with different ethnicities, \
             genders, and abilities. Ensure representation is natural and authentic.",
            prompt
        )
    }
}

/// Gemini-backed image model using multimodal output.
pub struct GeminiImageModel {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiImageModel {
    pub fn new(http: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        GeminiImageModel {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageModel for GeminiImageModel {
    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageData, ModelError> {
        let mut contents = Vec::new();

        // Replay the most recent seeds as a conversation so the model keeps
        // characters, art style, and palette consistent across pages.
        let start = request.seeds.len().saturating_sub(CONTEXT_SEED_LIMIT);
        let seeds = &request.seeds[start..];

        for seed in seeds {
            contents.push(json!({
                "role": "user",
                "parts": [
                    { "text": format!("Previous page prompt: {}", seed.prompt) },
                    {
                        "inlineData": {
                            "mimeType": seed.mime_type,
                            "data": BASE64.encode(&seed.data)
                        }
                    }
                ]
            }));
            contents.push(json!({
                "role": "model",
                "parts": [{
                    "text": "I've received this image and will maintain visual consistency with it."
                }]
            }));
        }

        if !seeds.is_empty() {
            contents.push(json!({
                "role": "user",
                "parts": [{
                    "text": "Please maintain character appearance, art style, and color palette \
                             consistency with these previous illustrations when creating the next image."
                }]
            }));
            contents.push(json!({
                "role": "model",
                "parts": [{
                    "text": "I'll ensure the characters, art style, and colors remain consistent \
                             with the previous illustrations."
                }]
            }));
        }

        contents.push(json!({
            "role": "user",
            "parts": [{ "text": illustration_prompt(&request.prompt, !seeds.is_empty()) }]
        }));

        let body = json!({
            "contents": contents,
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            }
        });

        let response = generate_content(&self.http, &self.api_key, &self.model, &body).await?;

        let inline = response
            .first_image()
            .ok_or_else(|| ModelError::InvalidResponse("no image part in response".to_string()))?;

        let data = BASE64
            .decode(&inline.data)
            .map_err(|err| ModelError::InvalidResponse(format!("bad image payload: {}", err)))?;

        Ok(ImageData {
            mime_type: inline.mime_type.clone(),
            data,
        })
    }
}

/// Deterministic placeholder reference for a failed or degraded image.
pub fn placeholder_url(label: &str) -> String {
    let encoded: String = label
        .chars()
        .take(30)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '+' })
        .collect();
    format!("/placeholder.svg?height=400&width=600&text={}", encoded)
}

pub fn is_placeholder(url: &str) -> bool {
    url.contains("/placeholder.svg")
}

fn is_hosted_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Result of illustrating one page. A `seed` is present only for genuine
/// successes; placeholders never seed future context.
#[derive(Debug)]
pub struct Illustration {
    pub url: String,
    pub seed: Option<SeedImage>,
}

#[derive(Debug, Error)]
enum IllustrateError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Never-fails wrapper around the image model and blob storage.
pub struct Illustrator {
    model: Arc<dyn ImageModel>,
    blobs: Arc<dyn BlobStore>,
}

impl Illustrator {
    pub fn new(model: Arc<dyn ImageModel>, blobs: Arc<dyn BlobStore>) -> Self {
        Illustrator { model, blobs }
    }

    /// Generates and stores the illustration for one page.
    ///
    /// Every failure mode (model error, missing payload, upload error, or an
    /// upload reference that is not a hosted URL) degrades to a placeholder
    /// embedding the truncated prompt; the returned URL is never empty.
    pub async fn illustrate(
        &self,
        prompt: &str,
        story_id: &str,
        page_index: usize,
        seeds: &[SeedImage],
    ) -> Illustration {
        match self.try_illustrate(prompt, story_id, page_index, seeds).await {
            Ok(illustration) => illustration,
            Err(err) => {
                tracing::warn!(
                    story_id,
                    page_index,
                    error = %err,
                    "image generation degraded to placeholder"
                );
                Illustration {
                    url: placeholder_url(prompt),
                    seed: None,
                }
            }
        }
    }

    async fn try_illustrate(
        &self,
        prompt: &str,
        story_id: &str,
        page_index: usize,
        seeds: &[SeedImage],
    ) -> Result<Illustration, IllustrateError> {
        let request = ImageRequest {
            prompt: prompt.to_string(),
            seeds: seeds.to_vec(),
        };

        let image = self.model.generate_image(&request).await?;
        let url = self
            .blobs
            .upload(&image.data, &image.mime_type, story_id, page_index)
            .await?;

        if !is_hosted_url(&url) {
            tracing::warn!(story_id, page_index, url, "upload did not yield a hosted URL");
            return Ok(Illustration {
                url: placeholder_url(prompt),
                seed: None,
            });
        }

        Ok(Illustration {
            url,
            seed: Some(SeedImage {
                mime_type: image.mime_type,
                data: image.data,
                prompt: prompt.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_prompt_has_no_consistency_clause() {
        let fresh = illustration_prompt("a crab waving hello", false);
        assert!(!fresh.contains("consistent style with any previous images"));
        assert!(fresh.contains("a crab waving hello"));

        let seeded = illustration_prompt("a crab waving hello", true);
        assert!(seeded.contains("consistent style with any previous images"));
    }

    #[test]
    fn placeholder_encodes_a_truncated_label() {
        let url = placeholder_url("A very long prompt about sea creatures helping each other");
        assert!(url.starts_with("/placeholder.svg?height=400&width=600&text="));
        assert!(is_placeholder(&url));
        let text = url.rsplit('=').next().unwrap();
        assert_eq!(text.len(), 30);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric() || c == '+'));
    }
}
