//! Provider abstractions for embeddings and LLM completion
//!
//! Trait-based so the hosted Gemini API and a local Ollama server are
//! interchangeable, and tests can substitute deterministic fakes.

pub mod embedding;
pub mod gemini;
pub mod llm;
pub mod ollama;
mod retry;

use std::sync::Arc;

use crate::config::{ProviderKind, RagConfig};
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use gemini::{GeminiClient, GeminiEmbedder};
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
pub use retry::{AttemptError, RetryPolicy};

/// The embedding and completion backends used by the service
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
}

impl Providers {
    /// Build the providers selected in the configuration
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let mut ollama: Option<Arc<OllamaClient>> = None;
        let mut ollama_client = || -> Result<Arc<OllamaClient>> {
            if let Some(client) = &ollama {
                return Ok(Arc::clone(client));
            }
            let client = Arc::new(OllamaClient::new(&config.llm)?);
            ollama = Some(Arc::clone(&client));
            Ok(client)
        };

        let llm: Arc<dyn LlmProvider> = match config.llm.provider {
            ProviderKind::Gemini => Arc::new(GeminiClient::new(&config.llm)?),
            ProviderKind::Ollama => Arc::new(OllamaLlm::from_client(ollama_client()?, &config.llm)),
        };

        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
            ProviderKind::Gemini => Arc::new(GeminiEmbedder::new(&config.llm, &config.embeddings)?),
            ProviderKind::Ollama => Arc::new(OllamaEmbedder::from_client(
                ollama_client()?,
                &config.embeddings,
            )),
        };

        tracing::info!(
            "Using LLM {} ({}) and embeddings {} ({} dims)",
            llm.name(),
            llm.model(),
            embedder.name(),
            embedder.dimensions()
        );

        Ok(Self { embedder, llm })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = RagConfig::default();
        config.llm.provider = ProviderKind::Ollama;
        config.llm.model = "llama3.2".to_string();
        config.embeddings.provider = ProviderKind::Ollama;
        config.embeddings.model = "nomic-embed-text".to_string();

        let providers = Providers::from_config(&config).unwrap();
        assert_eq!(providers.llm.name(), "ollama");
        assert_eq!(providers.llm.model(), "llama3.2");
        assert_eq!(providers.embedder.dimensions(), 768);
    }

    #[test]
    fn test_gemini_without_key_fails() {
        let mut config = RagConfig::default();
        config.llm.api_key = None;
        assert!(Providers::from_config(&config).is_err());
    }
}
