//! Shared wire types for the Gemini `generateContent` REST API
//!
//! The text and image clients both speak this endpoint; they differ only in
//! the request body they build and in which part of the response they read.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Errors from a model provider call.
///
/// No retry happens at this level; callers decide whether a failure is fatal
/// (text stage) or degradable (image stage).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model API key is not configured")]
    MissingApiKey,

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Deserialize, Debug)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Deserialize, Debug)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    /// First text part of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts().find_map(|p| p.text.as_deref())
    }

    /// First inline image part of the first candidate, if any.
    pub fn first_image(&self) -> Option<&InlineData> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref())
            .filter(|d| d.mime_type.starts_with("image/"))
    }
}

/// Issues one `generateContent` call and decodes the response envelope.
///
/// The caller's `reqwest::Client` carries the request timeout, so a hung
/// provider surfaces here as a `Transport` error.
pub async fn generate_content(
    http: &Client,
    api_key: &str,
    model: &str,
    body: &serde_json::Value,
) -> Result<GenerateContentResponse, ModelError> {
    if api_key.is_empty() {
        return Err(ModelError::MissingApiKey);
    }

    let url = format!("{}/models/{}:generateContent", API_BASE, model);
    let response = http
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ModelError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json::<GenerateContentResponse>().await?)
}
