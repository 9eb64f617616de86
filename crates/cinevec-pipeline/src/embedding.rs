//! Embedding client — turns each record's text blob into a fixed-dimension
//! vector via an external model.
//!
//! Backends:
//!   - Gemini         (batchEmbedContents, the production provider)
//!   - OpenAI-compat  (any /v1/embeddings endpoint — Ollama, vLLM, …)
//!
//! Error classification matters more than the transport: 429 and timeouts
//! are retryable with bounded exponential backoff, anything else fails the
//! row immediately. One row's failure never aborts the transform run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

use cinevec_common::{CinevecError, SandboxClient};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Embedding provider rate limited the request")]
    RateLimited,

    #[error("Embedding request timed out")]
    Timeout,

    #[error("Embedding service error [{status}]: {message}")]
    Service { status: u16, message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Embedding response shape mismatch: {0}")]
    Response(String),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error(transparent)]
    Sandbox(#[from] CinevecError),
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbedError::Timeout
        } else {
            EmbedError::Http(e)
        }
    }
}

impl EmbedError {
    /// Rate limits and timeouts are worth retrying with backoff; a 4xx or a
    /// wrong-arity response will not get better on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::RateLimited | EmbedError::Timeout => true,
            EmbedError::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}

// ── Backend config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Gemini,
    OpenAiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub api_key: Option<String>,
    pub model: String,
    pub dim: usize,
    pub batch_size: usize,
    pub base_url: Option<String>,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Gemini,
            api_key: None,
            model: "embedding-001".to_string(),
            dim: 768,
            batch_size: 100,
            base_url: None,
            max_retries: 4,
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// One embedding call: same order and length out as in, every vector
/// exactly `dim` components.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Provider's maximum batch size; the transform chunks to this.
    fn batch_size(&self) -> usize;
}

// ── Embedding client ──────────────────────────────────────────────────────────

pub struct EmbeddingClient {
    cfg: EmbeddingConfig,
    client: SandboxClient,
}

impl EmbeddingClient {
    pub fn new(cfg: EmbeddingConfig) -> Result<Self, CinevecError> {
        Ok(Self {
            cfg,
            client: SandboxClient::new()?,
        })
    }

    // ── Gemini ─────────────────────────────────────────────────────────────

    async fn embed_gemini(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let key = self.cfg.api_key.as_deref().unwrap_or("");
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": format!("models/{}", self.cfg.model),
                    "content": { "parts": [{ "text": t }] },
                    "taskType": "RETRIEVAL_DOCUMENT",
                })
            })
            .collect();
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
            self.cfg.model, key
        );

        let resp = self
            .client
            .post(&url)?
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;
        let body = check_response_status(resp).await?;

        let parsed: GeminiBatchResponse =
            serde_json::from_value(body).map_err(|e| EmbedError::Response(e.to_string()))?;
        let vectors: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
        self.validate_shape(texts.len(), vectors)
    }

    // ── OpenAI-compatible ──────────────────────────────────────────────────

    async fn embed_compat(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');
        let url = format!("{}/v1/embeddings", base);

        let mut req = self.client.post(&url)?.json(&serde_json::json!({
            "model": &self.cfg.model,
            "input": texts,
        }));
        if let Some(ref k) = self.cfg.api_key {
            req = req.bearer_auth(k);
        }
        let resp = req.send().await?;
        let body = check_response_status(resp).await?;

        let mut parsed: CompatResponse =
            serde_json::from_value(body).map_err(|e| EmbedError::Response(e.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        self.validate_shape(texts.len(), vectors)
    }

    /// Enforce the fixed-dimension contract before anything downstream sees
    /// the vectors.
    fn validate_shape(
        &self,
        expected_len: usize,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if vectors.len() != expected_len {
            return Err(EmbedError::Response(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                expected_len
            )));
        }
        for v in &vectors {
            if v.len() != self.cfg.dim {
                return Err(EmbedError::Dimension {
                    expected: self.cfg.dim,
                    actual: v.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    #[instrument(skip(self, texts), fields(n = texts.len(), backend = ?self.cfg.backend))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        match self.cfg.backend {
            EmbeddingBackend::Gemini => self.embed_gemini(texts).await,
            EmbeddingBackend::OpenAiCompatible => self.embed_compat(texts).await,
        }
    }

    fn batch_size(&self) -> usize {
        self.cfg.batch_size
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, EmbedError> {
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(EmbedError::RateLimited);
    }
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(EmbedError::Service { status, message });
    }
    Ok(body)
}

// ── Typed responses ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct CompatResponse {
    data: Vec<CompatEmbedding>,
}

#[derive(Debug, Deserialize)]
struct CompatEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

// ── Retry policy ──────────────────────────────────────────────────────────────

/// Exponential backoff schedule: 500ms doubling per attempt, capped.
pub fn retry_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(5);
    Duration::from_millis(500 * (1 << capped))
}

/// One embed call with bounded retries on retryable errors. Non-retryable
/// errors surface immediately; exhausting the budget surfaces the last
/// retryable error for the caller to record as row-level skips.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    texts: &[String],
    max_retries: u32,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut attempt = 0u32;
    loop {
        match embedder.embed_batch(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let wait = retry_backoff(attempt);
                warn!(attempt, wait_ms = wait.as_millis() as u64, error = %e,
                      "Embedding call failed; backing off");
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
