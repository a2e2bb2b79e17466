//! Text generation client
//!
//! One structured-output call turns a (title, theme, age range, letters)
//! request into a validated multi-page narrative. Failures propagate: there
//! is no narrative to fall back to, so the pipeline fails the whole job.
//! Retry policy, if any, belongs to the caller; this client makes a single
//! attempt.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::gemini::{generate_content, ModelError};
use crate::model::{StoryContent, StoryPage};

/// Moral used when the model omits one.
pub const DEFAULT_MORAL: &str = "Learning the alphabet is fun and helps us discover new words!";

/// Everything the text model needs to write one storybook.
#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub title: String,
    pub theme: String,
    pub age_range: String,
    pub letter_count: u32,
    pub letters: Vec<char>,
}

#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generates the narrative, validated against the page/moral schema.
    async fn generate_story(&self, request: &NarrativeRequest) -> Result<StoryContent, ModelError>;
}

/// Gemini-backed text model using JSON-schema constrained output.
pub struct GeminiTextModel {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiTextModel {
    pub fn new(http: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        GeminiTextModel {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

/// Shape the model is asked to produce. The letter field keeps the model
/// honest about one-page-per-letter; only text and imagePrompt are kept.
fn story_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "pages": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "letter": { "type": "STRING" },
                        "text": { "type": "STRING" },
                        "imagePrompt": { "type": "STRING" }
                    },
                    "required": ["letter", "text", "imagePrompt"]
                }
            },
            "moral": { "type": "STRING" }
        },
        "required": ["pages", "moral"]
    })
}

fn build_prompt(request: &NarrativeRequest) -> String {
    let letters: Vec<String> = request.letters.iter().map(|c| c.to_string()).collect();
    format!(
        r#"Create a children's ABC content titled "{title}" for ages {age} about: {theme}.

IMPORTANT: The content MUST be about the title "{title}" and incorporate this title as the central theme.

The content should progress through the first {count} letters of the alphabet ({letters}).

Each page should:
1. Start with a sentence or phrase beginning with the corresponding letter (A, B, C, D, etc.)
2. Relate to the overall theme of "{title}"
3. Be engaging and educational for children in the {age} age range

IMPORTANT: Choose the most appropriate format based on the title and theme:

- If the title suggests a narrative (like an adventure or journey), create a flowing story where each page continues from the previous one with consistent characters and plot progression.
  Example narrative:
  - "A long time ago, Max was looking for friends in the magical forest..."
  - "Before too long, he spotted a small rabbit hiding behind a tree..."

- If the title suggests a collection or concept (like "Animals of Africa" or "Colors"), create thematic content where each page explores a different aspect of the theme while still connecting to the overall concept.
  Example collection:
  - "Amazing elephants have the largest ears of any animal in Africa..."
  - "Beautiful zebras have black and white stripes that help them hide from predators..."

Make the content engaging, age-appropriate, and include educational value or a moral lesson when appropriate.
For each page, also create a detailed image prompt that captures the key moment or concept on that page.
The image prompts should be detailed enough for an AI image generator to create a consistent illustration."#,
        title = request.title,
        age = request.age_range,
        theme = request.theme,
        count = request.letter_count,
        letters = letters.join(", "),
    )
}

const SYSTEM_INSTRUCTION: &str = "You are a children's ABC content creator. Create engaging, \
educational content that helps children learn the alphabet. This can be in the form of flowing \
narratives with consistent characters and plot, or thematic explorations that connect concepts \
to each letter. Always make the title the central theme of your content, adapting your format \
to best suit the title and theme.";

#[derive(Deserialize)]
struct GeneratedStory {
    #[serde(default)]
    pages: Vec<GeneratedPage>,
    #[serde(default)]
    moral: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedPage {
    text: String,
    image_prompt: String,
}

#[async_trait]
impl TextModel for GeminiTextModel {
    async fn generate_story(&self, request: &NarrativeRequest) -> Result<StoryContent, ModelError> {
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_INSTRUCTION }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(request) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": story_schema()
            }
        });

        let response = generate_content(&self.http, &self.api_key, &self.model, &body).await?;

        let text = response
            .first_text()
            .ok_or_else(|| ModelError::InvalidResponse("no text part in response".to_string()))?;

        let generated: GeneratedStory = serde_json::from_str(text)
            .map_err(|err| ModelError::InvalidResponse(format!("schema mismatch: {}", err)))?;

        if generated.pages.is_empty() {
            return Err(ModelError::InvalidResponse(
                "response contained no pages".to_string(),
            ));
        }

        Ok(StoryContent {
            title: request.title.clone(),
            pages: generated
                .pages
                .into_iter()
                .map(|page| StoryPage {
                    text: page.text,
                    image_prompt: page.image_prompt,
                })
                .collect(),
            moral: generated
                .moral
                .filter(|moral| !moral.is_empty())
                .unwrap_or_else(|| DEFAULT_MORAL.to_string()),
        })
    }
}
