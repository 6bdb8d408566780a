//! ============================================================================
//! Gemini Strategies - Call shapes for Google's generative API
//! ============================================================================
//! - GeminiRestStrategy: `models/{model}:generateContent` on a given API
//!   version (v1beta first, then the stable v1 surface)
//! - OpenAiCompatStrategy: OpenAI-style `/chat/completions`, which Gemini
//!   also serves under `/v1beta/openai`
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationStrategy, StrategyError};

/// Root of Google's generative language API
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Map a non-success HTTP status onto a strategy error
fn classify_status(status: u16, body: &str) -> StrategyError {
    match status {
        // Endpoint, method, or model missing on this surface
        404 | 405 | 501 => StrategyError::UnsupportedShape(format!("HTTP {}: {}", status, body)),
        _ => StrategyError::Failed(format!("HTTP {}: {}", status, body)),
    }
}

// ============================================================================
// generateContent
// ============================================================================

/// `POST {base}/{version}/models/{model}:generateContent`
pub struct GeminiRestStrategy {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    api_version: String,
    model: String,
    name: String,
}

impl GeminiRestStrategy {
    pub fn new(api_key: String, api_version: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            api_version: api_version.to_string(),
            model: model.to_string(),
            name: format!("gemini-{}", api_version),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.model
        )
    }
}

#[async_trait]
impl GenerationStrategy for GeminiRestStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, StrategyError> {
        debug!("Calling {} with {} chars", self.endpoint(), prompt.len());

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StrategyError::Failed(format!("Failed to call Gemini API: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        parse_generate_content(&body)
    }
}

/// Pull the answer text out of a `generateContent` response body
fn parse_generate_content(body: &str) -> Result<String, StrategyError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| StrategyError::UnsupportedShape(format!("unexpected response: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(StrategyError::Failed(format!("prompt blocked: {}", reason)));
    }

    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());

    let text: String = candidate
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        // SAFETY, RECITATION, BLOCKLIST, ... are content refusals
        if let Some(reason) = finish_reason.filter(|r| r != "STOP") {
            return Err(StrategyError::Failed(format!(
                "candidate finished with {}",
                reason
            )));
        }
        return Err(StrategyError::UnsupportedShape(
            "response carried no text".into(),
        ));
    }

    Ok(text)
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

/// `POST {base}/chat/completions`
pub struct OpenAiCompatStrategy {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatStrategy {
    pub fn new(api_key: String, base_url: impl Into<String>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerationStrategy for OpenAiCompatStrategy {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(&self, prompt: &str) -> Result<String, StrategyError> {
        debug!("Calling OpenAI-compatible API with {} chars", prompt.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| StrategyError::Failed(format!("Failed to call chat API: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        parse_chat_completion(&body)
    }
}

fn parse_chat_completion(body: &str) -> Result<String, StrategyError> {
    let chat_response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| StrategyError::UnsupportedShape(format!("unexpected response: {}", e)))?;

    chat_response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| StrategyError::UnsupportedShape("No response from API".into()))
}

/// The default ordered call shapes for a Gemini API key
pub fn gemini_strategies(api_key: &str, model: &str) -> Vec<Box<dyn GenerationStrategy>> {
    vec![
        Box::new(GeminiRestStrategy::new(api_key.to_string(), "v1beta", model)),
        Box::new(GeminiRestStrategy::new(api_key.to_string(), "v1", model)),
        Box::new(OpenAiCompatStrategy::new(
            api_key.to_string(),
            format!("{}/v1beta/openai", GEMINI_BASE_URL),
            model,
        )),
    ]
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
