//! OpenAI-compatible embeddings client.

use crate::config::EmbeddingConfig;
use crate::embeddings::Embedder;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One request per text; no client-side batching.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    dimensions: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "missing embedding API key".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| EmbeddingError::NotConfigured("invalid embedding API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            dimensions: config.dimensions,
            max_retries: config.max_retries.max(1),
        })
    }

    async fn request_once(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model,
            input: text,
            dimensions: supports_dimensions(model).then_some(self.dimensions),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_failure(status, &body));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed.into_vector(self.dimensions)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut attempt = 0usize;
        loop {
            match self.request_once(text, model).await {
                Ok(vector) => return Ok(vector),
                Err(error) if is_retryable(&error) && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, %error, "retrying embedding request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn supports_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

fn is_retryable(error: &EmbeddingError) -> bool {
    match error {
        EmbeddingError::RateLimited(_) => true,
        EmbeddingError::Backend { status, .. } => *status >= 500,
        EmbeddingError::Http(error) => error.is_timeout() || error.is_connect(),
        _ => false,
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn classify_failure(status: StatusCode, body: &str) -> EmbeddingError {
    let api_error = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let details = api_error
        .as_ref()
        .and_then(|error| error.message.clone())
        .unwrap_or_else(|| body.to_string());
    let code = api_error
        .and_then(|error| error.code.or(error.kind))
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::Unauthorized(details),
        StatusCode::TOO_MANY_REQUESTS if code == "insufficient_quota" => {
            EmbeddingError::QuotaExceeded(details)
        }
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited(details),
        _ => EmbeddingError::Backend {
            status: status.as_u16(),
            details,
        },
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    fn into_vector(self, expected_dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingError::MalformedResponse("response had no data".to_string()))?;

        if vector.len() != expected_dimensions {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {expected_dimensions} dimensions, got {}",
                vector.len()
            )));
        }

        Ok(vector)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}
