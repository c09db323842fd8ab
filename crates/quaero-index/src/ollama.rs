//! Ollama embedding encoder.
//!
//! Talks to a local (or remote) Ollama server's `/api/embed` endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use crate::encoder::{Encoder, EncoderError, EncoderProvider, Result, SharedEncoder, check_batch};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "all-minilm";

/// Default timeout for embedding requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Text sent once at acquisition to learn the vector dimension.
const PROBE_TEXT: &str = "dimension probe";

/// Configuration for the Ollama encoder.
#[derive(Debug, Clone)]
pub struct OllamaEncoderConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries for network errors on encode calls.
    pub max_retries: u32,
    /// Initial backoff between retries.
    pub retry_backoff: Duration,
}

impl Default for OllamaEncoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl OllamaEncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Full URL of the embed endpoint.
    pub fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Encoder backed by an Ollama server.
pub struct OllamaEncoder {
    client: Client,
    config: OllamaEncoderConfig,
    dimension: usize,
}

impl std::fmt::Debug for OllamaEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEncoder")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OllamaEncoder {
    /// Connect to the server and learn the model's vector dimension.
    ///
    /// The probe is not retried: if the server or model is unavailable the
    /// caller gets [`EncoderError::Unavailable`] straight away.
    pub async fn connect(config: OllamaEncoderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EncoderError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        let probe = [PROBE_TEXT.to_string()];
        let vectors = embed_once(&client, &config, &probe)
            .await
            .map_err(|e| EncoderError::Unavailable(format!("{} ({})", e, config.model)))?;
        let vectors = check_batch(1, vectors)?;
        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(EncoderError::Unavailable(format!(
                "model '{}' returned an empty embedding",
                config.model
            )));
        }

        tracing::info!(
            model = %config.model,
            base_url = %config.base_url,
            dimension,
            "Connected to Ollama encoder"
        );

        Ok(Self {
            client,
            config,
            dimension,
        })
    }

    pub fn config(&self) -> &OllamaEncoderConfig {
        &self.config
    }
}

#[async_trait]
impl Encoder for OllamaEncoder {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = &self.client;
        let config = &self.config;
        let vectors = with_retry(config.max_retries, config.retry_backoff, move || {
            embed_once(client, config, texts)
        })
        .await?;
        let vectors = check_batch(texts.len(), vectors)?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EncoderError::Protocol(format!(
                "expected {}-dimensional vectors, got {}",
                self.dimension,
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

/// Provider that connects to Ollama on acquisition.
#[derive(Debug, Clone, Default)]
pub struct OllamaEncoderProvider {
    config: OllamaEncoderConfig,
}

impl OllamaEncoderProvider {
    pub fn new(config: OllamaEncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EncoderProvider for OllamaEncoderProvider {
    async fn acquire(&self) -> Result<SharedEncoder> {
        let encoder = OllamaEncoder::connect(self.config.clone()).await?;
        Ok(Arc::new(encoder))
    }
}

async fn embed_once(
    client: &Client,
    config: &OllamaEncoderConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let body = EmbedRequest {
        model: &config.model,
        input: texts,
    };

    let response = client
        .post(config.embed_url())
        .header(header::CONTENT_TYPE, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| EncoderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EncoderError::Protocol(format!(
            "Ollama returned {}: {}",
            status, text
        )));
    }

    let parsed: EmbedResponse = response
        .json()
        .await
        .map_err(|e| EncoderError::Protocol(format!("Invalid embed response: {}", e)))?;
    Ok(parsed.embeddings)
}

/// Retry an operation with exponential backoff on network errors only.
async fn with_retry<F, Fut, T>(max_retries: u32, initial_backoff: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(EncoderError::Network(msg)) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %msg,
                    "Embedding request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_config_defaults() {
        let config = OllamaEncoderConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_embed_url_trims_trailing_slash() {
        let config = OllamaEncoderConfig::new().with_base_url("http://gpu-box:11434/");
        assert_eq!(config.embed_url(), "http://gpu-box:11434/api/embed");
    }

    #[test]
    fn test_request_shape() {
        let input = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_value(EmbedRequest {
            model: "all-minilm",
            input: &input,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"model": "all-minilm", "input": ["a", "b"]}));
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_unavailable() {
        let config = OllamaEncoderConfig::new()
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));
        let err = OllamaEncoder::connect(config).await.unwrap_err();
        assert!(matches!(err, EncoderError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_retry_only_network_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EncoderError::Protocol("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EncoderError::Network("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(EncoderError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EncoderError::Network("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
