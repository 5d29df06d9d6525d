//! Blocking client for OpenAI-compatible `/embeddings` endpoints

use super::Embedder;
use crate::error::{PipelineError, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct RemoteEmbedder {
    http: HttpClient,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl RemoteEmbedder {
    /// `base_url` is the API root (e.g. `http://localhost:11434/v1`); `timeout`
    /// bounds every call.
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: usize,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "remote embeddings need a model name".into(),
            ));
        }
        if dimension == 0 {
            return Err(PipelineError::InvalidConfig(
                "remote embeddings need a positive dimension".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| PipelineError::InvalidConfig("invalid embeddings API key".into()))?,
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
        })
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(endpoint = %self.endpoint, inputs = inputs.len(), "remote embedding request");
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("embeddings request failed ({}): {}", status, body);
            return Err(if is_retryable_status(status) {
                PipelineError::embedding_transient(message)
            } else {
                PipelineError::embedding(message)
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| PipelineError::embedding(format!("failed to parse embedding response: {}", e)))?;

        // The API may return entries out of order
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(PipelineError::embedding(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() != self.dimension {
                    return Err(PipelineError::DimensionMismatch {
                        expected: self.dimension,
                        actual: entry.embedding.len(),
                    });
                }
                Ok(entry.embedding)
            })
            .collect()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_send_error(err: reqwest::Error) -> PipelineError {
    let message = format!("embeddings request failed: {}", err);
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PipelineError::embedding_transient(message)
    } else {
        PipelineError::embedding(message)
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::embedding("service returned no embedding"))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request(&inputs)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
