//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates text embeddings using Gemini's `embedContent` API, or any
//! OpenAI-compatible `/embeddings` endpoint as an alternate provider.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default Gemini embedding model
pub const GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Gemini text-embedding-004 produces 768-dimensional vectors
pub const GEMINI_EMBEDDING_DIM: u64 = 768;

/// OpenAI-compatible fallback model
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Native size of text-embedding-3-small
pub const OPENAI_EMBEDDING_DIM: u64 = 1536;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Anything that turns text into a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Output dimension this embedder is configured for
    fn dimension(&self) -> u64;

    /// Generate embedding for a single text
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// Gemini
// ============================================================================

/// Embedding service backed by Gemini's `embedContent`
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: GEMINI_EMBEDDING_MODEL.to_string(),
            dimension: GEMINI_EMBEDDING_DIM,
        }
    }

    /// Use a different model; `dimension` must be what that model emits
    pub fn with_model(mut self, model: impl Into<String>, dimension: u64) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Embedding {} chars with {}", text.len(), self.model);

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: (self.dimension != GEMINI_EMBEDDING_DIM).then_some(self.dimension),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(api_error("Gemini embedding", status, &body));
        }

        let parsed: EmbedContentResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {} - body: {}", e, body))?;

        Ok(parsed.embedding.values)
    }
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

/// Embedder for OpenAI-compatible `/embeddings` endpoints
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            model: OPENAI_EMBEDDING_MODEL.to_string(),
            dimension: OPENAI_EMBEDDING_DIM,
        }
    }

    /// Ask the provider to shorten vectors to `dimension`
    pub fn with_dimension(mut self, dimension: u64) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Embedding {} chars with {}", text.len(), self.model);

        let request = EmbeddingsRequest {
            model: &self.model,
            input: [text],
            dimensions: (self.dimension != OPENAI_EMBEDDING_DIM).then_some(self.dimension),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(api_error("Embedding", status, &body));
        }

        first_embedding(&body)
    }
}

/// Lowest-index vector of an `/embeddings` response
fn first_embedding(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbeddingsResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse embedding response: {} - body: {}", e, body))?;

    parsed
        .data
        .into_iter()
        .min_by_key(|item| item.index)
        .map(|item| item.embedding)
        .ok_or_else(|| anyhow!("No embedding returned"))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Both Gemini and OpenAI wrap failures as `{"error": {"message": ...}}`
fn api_error(provider: &str, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => anyhow!("{} API error ({}): {}", provider, status, parsed.error.message),
        Err(_) => anyhow!("{} API error ({}): {}", provider, status, body),
    }
}

/// Pick an embedder: Gemini when a key is present, else OpenAI.
///
/// `dimension` is the process-wide expected size; the chosen provider is
/// asked for vectors of that size.
pub fn create_embedding_service(
    gemini_api_key: Option<String>,
    openai_api_key: Option<String>,
    gemini_model: &str,
    dimension: u64,
) -> Result<Box<dyn Embedder>> {
    if let Some(key) = gemini_api_key.filter(|k| !k.is_empty()) {
        debug!("Using Gemini for embeddings");
        return Ok(Box::new(
            GeminiEmbedder::new(key).with_model(gemini_model, dimension),
        ));
    }

    if let Some(key) = openai_api_key.filter(|k| !k.is_empty()) {
        warn!("Gemini API key not available, falling back to OpenAI for embeddings");
        return Ok(Box::new(OpenAiEmbedder::new(key).with_dimension(dimension)));
    }

    Err(anyhow!(
        "No embedding API key available (tried Gemini and OpenAI)"
    ))
}
