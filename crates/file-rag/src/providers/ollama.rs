//! Ollama-based providers for embeddings and LLM

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;
use super::retry::{AttemptError, RetryPolicy};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama API client with automatic retry
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Server base URL
    base_url: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Create a new Ollama client with retry support
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, AttemptError>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(Error::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(
                status,
                Error::llm(format!("Ollama request failed: HTTP {} - {}", status, body)),
            ));
        }

        response.json::<R>().await.map_err(|e| {
            AttemptError::Fatal(Error::llm(format!("Failed to parse Ollama response: {}", e)))
        })
    }

    /// Generate an embedding with retry
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest { model, prompt: text };
        let response: EmbedResponse = self
            .retry
            .run("Ollama embed", || self.post("/api/embeddings", &request))
            .await
            .map_err(|e| Error::embedding(e.to_string()))?;
        Ok(response.embedding)
    }

    /// Non-streaming completion with retry
    pub async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        tracing::debug!("Generating with Ollama model: {}", model);
        let response: GenerateResponse = self
            .retry
            .run("Ollama generate", || self.post("/api/generate", &request))
            .await?;
        Ok(response.response)
    }
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create from an existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client.embed(&self.model, text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
}

impl OllamaLlm {
    /// Create from an existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.client.generate(&self.model, prompt, self.temperature).await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama3.2",
            prompt: "hi",
            stream: false,
            options: GenerateOptions { temperature: 0.5 },
        })
        .unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.5);

        let body = serde_json::to_value(EmbedRequest {
            model: "nomic-embed-text",
            prompt: "hi",
        })
        .unwrap();
        assert_eq!(body["prompt"], "hi");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let config = LlmConfig {
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = Arc::new(OllamaClient::new(&config).unwrap());
        let llm = OllamaLlm::from_client(client, &config);

        assert!(llm.complete("hello").await.is_err());
    }
}
