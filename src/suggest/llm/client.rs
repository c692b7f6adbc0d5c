use super::models::{ModelRequest, SafetySetting, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Gemini REST API root (v1beta carries `responseSchema` support)
pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// The remote text-generation capability.
///
/// One call, one attempt: implementations must not retry. Any failure comes
/// back as an error carrying a readable message.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> anyhow::Result<String>;
}

/// Client for the Gemini `generateContent` endpoint.
///
/// Built once per process and shared by reference; `reqwest::Client` pools
/// connections internally so concurrent calls need no extra locking.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let base_url = Url::parse(GEMINI_API_BASE)?;
        Ok(Self {
            http: create_http_client(timeout_secs)?,
            api_key: api_key.into(),
            base_url,
        })
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid Gemini base URL '{}': {}", base_url, e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        self.base_url = base;
        Ok(self)
    }

    fn endpoint(&self, model: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(&format!("models/{}:generateContent", model))
            .map_err(|e| anyhow::anyhow!("Invalid model name '{}': {}", model, e))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> anyhow::Result<String> {
        let url = self.endpoint(&request.model)?;
        let body = GenerateContentRequest::from_request(request);

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(http_error(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse Gemini response: {}\n{}",
                e,
                sanitize_api_response(&text)
            )
        })?;

        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                total_tokens = usage.total_token_count,
                "Gemini usage"
            );
        }

        extract_text(parsed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WIRE FORMAT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig<'a>,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    response_mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a ModelRequest) -> Self {
        let generation = &request.generation;
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: WireGenerationConfig {
                max_output_tokens: generation.max_output_tokens,
                temperature: generation.temperature,
                top_p: generation.top_p,
                top_k: generation.top_k,
                response_mime_type: "application/json",
                response_schema: request.response_schema.as_ref(),
            },
            safety_settings: &request.safety_settings,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Error envelope Gemini sends with non-2xx responses
#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiApiError,
}

#[derive(Deserialize)]
struct GeminiApiError {
    message: String,
}

/// Pull the text out of the first candidate.
///
/// Safety blocks are failures. An empty completion is not: it is handed on
/// so the parse step reports it as an empty response.
fn extract_text(response: GenerateContentResponse) -> anyhow::Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(anyhow::anyhow!(
            "Prompt was blocked by content safety filters ({})",
            reason
        ));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(anyhow::anyhow!("Gemini returned no candidates"));
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    match candidate.finish_reason.as_deref() {
        Some("SAFETY") | Some("PROHIBITED_CONTENT") if text.trim().is_empty() => {
            return Err(anyhow::anyhow!(
                "Response was blocked by content safety filters"
            ));
        }
        Some("MAX_TOKENS") => {
            tracing::warn!("Gemini stopped at the output token limit; response may be truncated");
        }
        _ => {}
    }

    Ok(text)
}

fn http_error(status: u16, body: &str) -> anyhow::Error {
    let message = serde_json::from_str::<GeminiErrorEnvelope>(body)
        .map(|envelope| sanitize_api_response(&envelope.error.message))
        .unwrap_or_else(|_| sanitize_api_response(body));

    match status {
        401 | 403 => anyhow::anyhow!(
            "Gemini rejected the API key ({}). Run 'chart-coder setup' or set GEMINI_API_KEY.",
            status
        ),
        429 => anyhow::anyhow!("Gemini quota or rate limit exceeded: {}", message),
        500..=599 => anyhow::anyhow!(
            "Gemini server error ({}). The service may be temporarily unavailable.",
            status
        ),
        _ => anyhow::anyhow!("API error {}: {}", status, message),
    }
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &["api_key", "apikey", "x-goog-api-key", "secret", "bearer"];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }
    truncated.to_string()
}

/// Create a configured HTTP client for Gemini requests
pub(crate) fn create_http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

fn map_transport_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow::anyhow!("Gemini request timed out. Please try again.")
    } else if err.is_connect() {
        anyhow::anyhow!("Could not connect to Gemini. Check your network and try again.")
    } else {
        err.into()
    }
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
