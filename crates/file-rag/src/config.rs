//! Configuration for the file-rag service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Generation model configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Retrieval and conversation memory
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                let config: RagConfig = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("Invalid config file {}: {}", path.display(), e))
                })?;
                tracing::info!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                tracing::debug!("Config file {} not found, using defaults", path.display());
                RagConfig::default()
            }
            None => RagConfig::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `GOOGLE_API_KEY`, `FILE_RAG_DATA_DIR`, `FILE_RAG_HOST` and `FILE_RAG_PORT`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(dir) = std::env::var("FILE_RAG_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(host) = std::env::var("FILE_RAG_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("FILE_RAG_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid FILE_RAG_PORT '{}': {}", port, e)))?;
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Storage layout, all paths derived from `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Directory holding uploaded raw files
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploaded_files")
    }

    /// Root of the per-collection vector index directories
    pub fn vectors_root(&self) -> PathBuf {
        self.data_dir.join("vectorstores")
    }

    /// Directory holding per-collection SQLite databases for CSV uploads
    pub fn csv_db_dir(&self) -> PathBuf {
        self.data_dir.join("csv_dbs")
    }

    /// Directory holding per-collection chat logs
    pub fn chat_dir(&self) -> PathBuf {
        self.data_dir.join("chat_history")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
        }
    }
}

/// Which backend serves a model
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language API (API key)
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend serving the generation model
    pub provider: ProviderKind,
    /// Generation model name
    pub model: String,
    /// Gemini API base URL
    pub gemini_base_url: String,
    /// Ollama base URL
    pub ollama_base_url: String,
    /// API key for the hosted model (usually from `GOOGLE_API_KEY`)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            api_key: None,
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend serving the embedding model
    pub provider: ProviderKind,
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions (768 for text-embedding-004 and nomic-embed-text)
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "text-embedding-004".to_string(),
            dimensions: 768,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks passed to the LLM per question
    pub top_k: usize,
    /// Past user/assistant pairs used as conversation memory (0 = single-turn)
    pub memory_turns: usize,
    /// Rows returned to the client for CSV answers
    pub max_result_rows: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            memory_turns: 3,
            max_result_rows: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RagConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50

            [llm]
            provider = "ollama"
            model = "llama3.2"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.llm.provider, ProviderKind::Ollama);
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_storage_layout() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/srv/rag"),
        };
        assert_eq!(storage.upload_dir(), PathBuf::from("/srv/rag/uploaded_files"));
        assert_eq!(storage.vectors_root(), PathBuf::from("/srv/rag/vectorstores"));
        assert_eq!(storage.csv_db_dir(), PathBuf::from("/srv/rag/csv_dbs"));
        assert_eq!(storage.chat_dir(), PathBuf::from("/srv/rag/chat_history"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.chunking.chunk_overlap, 200);
    }
}
