//! LLM provider trait for text completion

use async_trait::async_trait;
use crate::error::Result;

/// Trait for single-prompt text completion
///
/// Implementations:
/// - `GeminiClient`: Google Generative Language API (gemini-2.0-flash)
/// - `OllamaLlm`: Local Ollama server (llama3.2, phi3, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt, returning the model's text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// The model being used
    fn model(&self) -> &str;
}
