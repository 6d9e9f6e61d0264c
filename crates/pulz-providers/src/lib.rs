//! Thin HTTP client for the optional LLM classification backend. Grounded on
//! `_ollama_classify` in `original_source/openwebui-patch/pulz_backend.py`: a
//! single non-streaming `/api/generate` call against an Ollama-compatible
//! endpoint, hard 20s timeout, failures treated as "no refinement available"
//! rather than propagated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out")]
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

/// A configured handle onto one Ollama-compatible `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
        }
    }

    /// Issues one non-streaming generate call. Callers treat any `Err` as a
    /// silent, non-fatal refinement failure (`spec` §4.3 step 7) — this
    /// method never retries.
    pub async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ProviderError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = tokio::time::timeout(
            CLASSIFY_TIMEOUT,
            self.client.post(&self.url).json(&request).send(),
        )
        .await
        .map_err(|_| ProviderError::Timeout)??;
        let body = tokio::time::timeout(CLASSIFY_TIMEOUT, response.json::<GenerateResponse>())
            .await
            .map_err(|_| ProviderError::Timeout)??;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_carries_model_and_url() {
        let client = OllamaClient::new("http://localhost:11434/api/generate", "llama3.1");
        assert_eq!(client.url, "http://localhost:11434/api/generate");
        assert_eq!(client.model, "llama3.1");
    }
}
