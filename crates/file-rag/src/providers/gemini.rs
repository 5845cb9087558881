//! Gemini generation and embedding via the Generative Language API
//!
//! Authenticates with an API key sent in the `x-goog-api-key` header.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;
use super::retry::{AttemptError, RetryPolicy};

/// Most texts accepted by one `batchEmbedContents` call
const MAX_EMBED_BATCH: usize = 100;

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
    #[serde(rename = "taskType")]
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(5)
        .build()?)
}

fn require_key(api_key: Option<&str>) -> Result<String> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(key.to_string()),
        _ => Err(Error::Config(
            "GOOGLE_API_KEY must be set to use the gemini provider".to_string(),
        )),
    }
}

/// POST a JSON body and decode the JSON reply, classifying failures for retry
async fn post_json<B, R>(client: &Client, url: &str, api_key: &str, body: &B) -> std::result::Result<R, AttemptError>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client
        .post(url)
        .header("x-goog-api-key", api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable(Error::Http(e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AttemptError::from_status(
            status,
            Error::llm(format!("Gemini request failed: HTTP {} - {}", status, body)),
        ));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| AttemptError::Fatal(Error::llm(format!("Failed to parse Gemini response: {}", e))))
}

/// Gemini text generation client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// Create a client from the LLM configuration; requires an API key
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            api_key: require_key(config.api_key.as_deref())?,
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        tracing::debug!("Gemini generate ({} prompt chars) with {}", prompt.len(), self.model);

        let response: GenerateResponse = self
            .retry
            .run("Gemini generate", || post_json(&self.client, &url, &self.api_key, &request))
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::llm("Gemini returned no candidates"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Gemini embedding client
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    /// Create an embedder sharing the LLM section's endpoint, key and timeouts
    pub fn new(llm: &LlmConfig, config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(llm.timeout_secs)?,
            base_url: llm.gemini_base_url.trim_end_matches('/').to_string(),
            api_key: require_key(llm.api_key.as_deref())?,
            model: config.model.clone(),
            dimensions: config.dimensions,
            retry: RetryPolicy::new(llm.max_retries),
        })
    }

    fn request(&self, text: &str, task_type: &'static str) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let request = self.request(text, "RETRIEVAL_QUERY");

        let response: EmbedResponse = self
            .retry
            .run("Gemini embed", || post_json(&self.client, &url, &self.api_key, &request))
            .await
            .map_err(|e| Error::embedding(e.to_string()))?;

        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| self.request(t, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };

            let response: BatchEmbedResponse = self
                .retry
                .run("Gemini batch embed", || post_json(&self.client, &url, &self.api_key, &request))
                .await
                .map_err(|e| Error::embedding(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(GeminiClient::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_and_request_shape() {
        let config = LlmConfig {
            api_key: Some("k".to_string()),
            gemini_base_url: "https://example.test/v1beta/".to_string(),
            ..LlmConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let embedder = GeminiEmbedder::new(&config, &EmbeddingConfig::default()).unwrap();
        let body = serde_json::to_value(embedder.request("hi", "RETRIEVAL_QUERY")).unwrap();
        assert_eq!(body["model"], "models/text-embedding-004");
        assert_eq!(body["content"]["parts"][0]["text"], "hi");
        assert_eq!(body["taskType"], "RETRIEVAL_QUERY");
        assert!(body["content"].get("role").is_none());
    }

    #[test]
    fn test_response_parsing_tolerates_missing_fields() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"SELECT 1"}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.candidates.len(), 1);

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.candidates.is_empty());
    }
}
