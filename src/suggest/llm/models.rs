use serde::{Deserialize, Serialize};

/// Gemini model used when the config does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro-preview-03-25";

/// Sampling and size bounds sent with every request.
///
/// `max_output_tokens` is also the only bound on how long a call can run
/// server-side; callers that need a deadline wrap the whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 10_000,
            temperature: 0.4,
            top_p: 1.0,
            top_k: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockMediumAndAbove,
}

/// Content-safety threshold for one harm category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Medium-and-above blocking on every category.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::HateSpeech,
        HarmCategory::DangerousContent,
        HarmCategory::Harassment,
        HarmCategory::SexuallyExplicit,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

/// One call to the remote model. Built per operation and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    /// Declared output schema; `None` leaves the shape to the prompt.
    pub response_schema: Option<serde_json::Value>,
    pub generation: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, generation: GenerationConfig) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            response_schema: None,
            generation,
            safety_settings: default_safety_settings(),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Token accounting reported by Gemini in `usageMetadata`
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}
