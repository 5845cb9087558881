//! Collection lifecycle: upload, activate, ask, clear and delete
//!
//! A collection is one uploaded file plus what is derived from it: a SQLite
//! table for CSV files, a vector index for everything else, and a chat log.
//! Operations on the same collection are serialized by a per-collection lock.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{RagConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::generation::{ConversationalChain, SqlGenerator};
use crate::index::{IndexManager, VectorIndex};
use crate::ingestion::{DocumentLoader, TextChunker};
use crate::providers::Providers;
use crate::storage::{
    split_extension, table_name_for, ChatLogStore, ChatMessage, FileStore, QueryOutcome,
    TableStore,
};

/// How a collection answers questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// SQL over a table loaded from the CSV
    Csv,
    /// Retrieval over a vector index
    Rag,
}

impl CollectionMode {
    /// `csv` selects CSV mode; every other extension is a document
    pub fn from_ext(ext: &str) -> Self {
        if ext.trim_start_matches('.').eq_ignore_ascii_case("csv") {
            CollectionMode::Csv
        } else {
            CollectionMode::Rag
        }
    }
}

/// Extension of a stored name, lowercased and without the dot
pub fn extension_of(saved_name: &str) -> String {
    split_extension(saved_name)
        .1
        .trim_start_matches('.')
        .to_lowercase()
}

/// Queryable form of a collection
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Activation {
    Csv {
        db_path: String,
        table_name: String,
        schema: String,
    },
    Rag {
        vect_dir: String,
    },
}

/// Result of an upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub saved_name: String,
    pub filename: String,
    pub ext: String,
    #[serde(flatten)]
    pub activation: Activation,
}

/// Answer to a question
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AskResponse {
    Csv {
        sql: String,
        result: Vec<Map<String, Value>>,
        assistant: String,
    },
    Rag {
        answer: String,
    },
}

/// Orchestrates storage, ingestion, indexing and generation per collection
pub struct CollectionService {
    retrieval: RetrievalConfig,
    files: FileStore,
    tables: TableStore,
    chats: ChatLogStore,
    vectors_root: PathBuf,
    loader: DocumentLoader,
    indexer: IndexManager,
    sql: SqlGenerator,
    chain: ConversationalChain,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CollectionService {
    /// Create the service, creating the data directories
    pub fn new(config: &RagConfig, providers: Providers) -> Result<Self> {
        let storage = &config.storage;
        let vectors_root = storage.vectors_root();
        std::fs::create_dir_all(&vectors_root)?;

        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);

        Ok(Self {
            retrieval: config.retrieval.clone(),
            files: FileStore::new(storage.upload_dir())?,
            tables: TableStore::new(storage.csv_db_dir())?,
            chats: ChatLogStore::new(storage.chat_dir())?,
            vectors_root,
            loader: DocumentLoader::new(Duration::from_secs(config.llm.timeout_secs))?,
            indexer: IndexManager::new(chunker, Arc::clone(&providers.embedder)),
            sql: SqlGenerator::new(Arc::clone(&providers.llm)),
            chain: ConversationalChain::new(
                providers.embedder,
                providers.llm,
                config.retrieval.top_k,
                config.retrieval.memory_turns,
            ),
            locks: DashMap::new(),
        })
    }

    fn lock_for(&self, saved_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(saved_name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry unless another operation still holds or awaits it
    fn release_lock(&self, saved_name: &str) {
        self.locks
            .remove_if(saved_name, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn release_if_missing<T>(&self, saved_name: &str, result: &Result<T>) {
        if matches!(result, Err(Error::CollectionNotFound(_))) {
            self.release_lock(saved_name);
        }
    }

    fn vect_dir(&self, saved_name: &str) -> PathBuf {
        self.vectors_root.join(saved_name)
    }

    /// Store an upload and materialize it; `file_type` selects the mode and loader
    pub async fn upload(&self, filename: &str, file_type: &str, content: Vec<u8>) -> Result<UploadResponse> {
        let files = self.files.clone();
        let original = filename.to_string();
        let saved_name = tokio::task::spawn_blocking(move || files.save(&original, &content)).await??;

        let ext = match file_type.trim().to_lowercase() {
            t if t.is_empty() => extension_of(&saved_name),
            t => t,
        };

        let lock = self.lock_for(&saved_name);
        let _guard = lock.lock().await;

        let activation = match CollectionMode::from_ext(&ext) {
            CollectionMode::Csv => self.materialize_table(&saved_name, true).await?,
            CollectionMode::Rag => self.materialize_index(&saved_name, &ext, true).await?.1,
        };

        tracing::info!("Processed '{}' as '{}' ({})", filename, saved_name, ext);

        Ok(UploadResponse {
            saved_name,
            filename: filename.to_string(),
            ext,
            activation,
        })
    }

    /// Sorted stored collection names
    pub fn list(&self) -> Result<Vec<String>> {
        self.files.list()
    }

    /// Build the table or index if it is missing
    pub async fn activate(&self, saved_name: &str) -> Result<Activation> {
        validate_name(saved_name)?;
        let result = {
            let lock = self.lock_for(saved_name);
            let _guard = lock.lock().await;

            let ext = extension_of(saved_name);
            match CollectionMode::from_ext(&ext) {
                CollectionMode::Csv => self.materialize_table(saved_name, false).await,
                CollectionMode::Rag => self
                    .materialize_index(saved_name, &ext, false)
                    .await
                    .map(|(_, activation)| activation),
            }
        };
        self.release_if_missing(saved_name, &result);
        result
    }

    /// Answer a question, activating the collection first if needed
    pub async fn ask(&self, saved_name: &str, question: &str) -> Result<AskResponse> {
        validate_name(saved_name)?;
        let result = {
            let lock = self.lock_for(saved_name);
            let _guard = lock.lock().await;

            let ext = extension_of(saved_name);
            match CollectionMode::from_ext(&ext) {
                CollectionMode::Csv => self.ask_table(saved_name, question).await,
                CollectionMode::Rag => self.ask_index(saved_name, &ext, question).await,
            }
        };
        self.release_if_missing(saved_name, &result);
        result
    }

    async fn ask_table(&self, saved_name: &str, question: &str) -> Result<AskResponse> {
        let schema = match self.materialize_table(saved_name, false).await? {
            Activation::Csv { schema, .. } => schema,
            Activation::Rag { .. } => return Err(Error::internal("CSV collection produced an index")),
        };

        let sql = self.sql.generate(question, &schema).await?;

        let tables = self.tables.clone();
        let name = saved_name.to_string();
        let query = sql.clone();
        let outcome = tokio::task::spawn_blocking(move || tables.run_query(&name, &query)).await?;

        self.chats.append(saved_name, ChatMessage::user(question))?;

        let (result, assistant) = match outcome {
            QueryOutcome::Failed(message) => (Vec::new(), format!("❌ SQL Error: {}", message)),
            QueryOutcome::Rows(result) => {
                let assistant = match result.single_value() {
                    Some(value) => format!("The answer is **{}**.", display_value(value)),
                    None => format!("Returned {} rows. (Showing top 10)", result.rows.len()),
                };
                let rows = result
                    .rows
                    .into_iter()
                    .take(self.retrieval.max_result_rows)
                    .collect();
                (rows, assistant)
            }
        };

        self.chats.append(saved_name, ChatMessage::assistant(assistant.as_str()))?;

        Ok(AskResponse::Csv {
            sql,
            result,
            assistant,
        })
    }

    async fn ask_index(&self, saved_name: &str, ext: &str, question: &str) -> Result<AskResponse> {
        let (index, _) = self.materialize_index(saved_name, ext, false).await?;
        let history = self.chats.load(saved_name)?;

        let answer = self.chain.ask(&index, &history, question).await?.answer;

        self.chats.append(saved_name, ChatMessage::user(question))?;
        self.chats.append(saved_name, ChatMessage::assistant(answer.as_str()))?;

        Ok(AskResponse::Rag { answer })
    }

    /// Remove the file, index, table and chat log
    ///
    /// Failures are logged and reported as `false`.
    pub async fn delete(&self, saved_name: &str) -> bool {
        if let Err(e) = validate_name(saved_name) {
            tracing::warn!("Refusing to delete '{}': {}", saved_name, e);
            return false;
        }
        let removed = {
            let lock = self.lock_for(saved_name);
            let _guard = lock.lock().await;
            self.remove_artifacts(saved_name).await
        };

        match removed {
            Ok(()) => {
                self.release_lock(saved_name);
                tracing::info!("Deleted collection '{}'", saved_name);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to delete collection '{}': {}", saved_name, e);
                false
            }
        }
    }

    async fn remove_artifacts(&self, saved_name: &str) -> Result<()> {
        let files = self.files.clone();
        let tables = self.tables.clone();
        let chats = self.chats.clone();
        let vect_dir = self.vect_dir(saved_name);
        let name = saved_name.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            files.delete(&name)?;
            if vect_dir.exists() {
                std::fs::remove_dir_all(&vect_dir)?;
            }
            tables.delete(&name)?;
            chats.delete(&name)?;
            Ok(())
        })
        .await?
    }

    /// Empty the chat log
    pub async fn clear_chat(&self, saved_name: &str) -> Result<()> {
        validate_name(saved_name)?;
        let lock = self.lock_for(saved_name);
        let _guard = lock.lock().await;
        self.chats.clear(saved_name)
    }

    /// Full chat history
    pub fn chat(&self, saved_name: &str) -> Result<Vec<ChatMessage>> {
        validate_name(saved_name)?;
        self.chats.load(saved_name)
    }

    /// Load the CSV into its table; reuses an existing table unless `force`
    async fn materialize_table(&self, saved_name: &str, force: bool) -> Result<Activation> {
        let tables = self.tables.clone();
        let csv_path = self.files.path(saved_name);
        let name = saved_name.to_string();

        if (force || !tables.exists(&name)) && !csv_path.is_file() {
            return Err(Error::CollectionNotFound(name));
        }

        tokio::task::spawn_blocking(move || -> Result<Activation> {
            if force || !tables.exists(&name) {
                tables.load_csv(&csv_path, &name)?;
            }
            let schema = tables.table_info(&name)?;
            Ok(Activation::Csv {
                db_path: tables.db_path(&name).display().to_string(),
                table_name: table_name_for(&csv_path),
                schema,
            })
        })
        .await?
    }

    /// Open the collection's index, building it if missing or when `force`
    async fn materialize_index(
        &self,
        saved_name: &str,
        ext: &str,
        force: bool,
    ) -> Result<(VectorIndex, Activation)> {
        let vect_dir = self.vect_dir(saved_name);
        let activation = Activation::Rag {
            vect_dir: vect_dir.display().to_string(),
        };

        if !force {
            let dir = vect_dir.clone();
            if let Some(index) = tokio::task::spawn_blocking(move || VectorIndex::open_if_exists(&dir)).await?? {
                return Ok((index, activation));
            }
        }

        let path = self.files.path(saved_name);
        if !path.is_file() {
            return Err(Error::CollectionNotFound(saved_name.to_string()));
        }

        let docs = self.loader.load(&path, ext).await?;
        let (stem, _) = split_extension(saved_name);
        let (index, _) = self.indexer.build(&docs, &vect_dir, stem).await?;
        Ok((index, activation))
    }
}

/// Names are single path components chosen by the file store
fn validate_name(saved_name: &str) -> Result<()> {
    if saved_name.is_empty()
        || saved_name.contains(['/', '\\'])
        || saved_name == "."
        || saved_name == ".."
    {
        return Err(Error::CollectionNotFound(saved_name.to_string()));
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{EmbeddingProvider, LlmProvider};
    use async_trait::async_trait;

    struct WordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for WordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(vec![
                lower.matches("rust").count() as f32 + 0.01,
                lower.matches("python").count() as f32 + 0.01,
            ])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "words"
        }
    }

    /// Answers SQL prompts with a fixed statement and echoes retrieval context
    struct ScriptedLlm {
        sql: &'static str,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            if prompt.contains("expert SQL assistant") {
                return Ok(format!("```sql\n{}\n```", self.sql));
            }
            if prompt.contains("Standalone question:") {
                return Ok("What is Rust?".to_string());
            }
            let context = prompt
                .split("Context:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nQuestion:").next())
                .unwrap_or_default();
            Ok(format!("From context: {}", context))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn service(dir: &std::path::Path, sql: &'static str) -> CollectionService {
        let mut config = RagConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        let providers = Providers {
            embedder: Arc::new(WordEmbedder),
            llm: Arc::new(ScriptedLlm { sql }),
        };
        CollectionService::new(&config, providers).unwrap()
    }

    const CSV: &[u8] = b"name,language,stars\nserde,rust,9000\ntokio,rust,25000\ndjango,python,80000\n";

    #[tokio::test]
    async fn test_csv_upload_and_single_value_answer() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos WHERE language = 'rust'");

        let upload = service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();
        assert_eq!(upload.saved_name, "repos.csv");
        match &upload.activation {
            Activation::Csv { table_name, schema, .. } => {
                assert_eq!(table_name, "repos");
                assert!(schema.contains("Columns: name, language, stars"));
            }
            other => panic!("unexpected activation {:?}", other),
        }

        match service.ask("repos.csv", "How many rust repos?").await.unwrap() {
            AskResponse::Csv { sql, result, assistant } => {
                assert_eq!(sql, "SELECT COUNT(*) FROM repos WHERE language = 'rust'");
                assert_eq!(result.len(), 1);
                assert_eq!(assistant, "The answer is **2**.");
            }
            other => panic!("unexpected answer {:?}", other),
        }

        let chat = service.chat("repos.csv").unwrap();
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0], ChatMessage::user("How many rust repos?"));
    }

    #[tokio::test]
    async fn test_csv_multi_row_and_sql_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT name FROM repos");
        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();

        match service.ask("repos.csv", "List names").await.unwrap() {
            AskResponse::Csv { result, assistant, .. } => {
                assert_eq!(result.len(), 3);
                assert_eq!(assistant, "Returned 3 rows. (Showing top 10)");
            }
            other => panic!("unexpected answer {:?}", other),
        }

        let broken = self::service(dir.path(), "SELEC nme FROM");
        match broken.ask("repos.csv", "???").await.unwrap() {
            AskResponse::Csv { result, assistant, .. } => {
                assert!(result.is_empty());
                assert!(assistant.starts_with("❌ SQL Error: "));
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activate_reuses_table() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos");

        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();
        service.activate("repos.csv").await.unwrap();
        service.activate("repos.csv").await.unwrap();
        match service.ask("repos.csv", "count").await.unwrap() {
            AskResponse::Csv { assistant, .. } => assert_eq!(assistant, "The answer is **3**."),
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rag_upload_ask_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT 1");

        let upload = service
            .upload("langs.txt", "txt", b"Rust is a systems language.".to_vec())
            .await
            .unwrap();
        match &upload.activation {
            Activation::Rag { vect_dir } => assert!(vect_dir.ends_with("langs.txt")),
            other => panic!("unexpected activation {:?}", other),
        }

        match service.ask("langs.txt", "What is Rust?").await.unwrap() {
            AskResponse::Rag { answer } => {
                assert_eq!(answer, "From context: Rust is a systems language.");
            }
            other => panic!("unexpected answer {:?}", other),
        }

        // Second question goes through the condense step
        service.ask("langs.txt", "Tell me more").await.unwrap();
        assert_eq!(service.chat("langs.txt").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_ask_auto_activates_or_fails_without_source() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT 1");
        service
            .upload("notes.txt", "txt", b"Python and Rust".to_vec())
            .await
            .unwrap();
        std::fs::remove_dir_all(dir.path().join("vectorstores").join("notes.txt")).unwrap();

        assert!(service.ask("notes.txt", "What?").await.is_ok());

        let err = service.ask("missing.pdf", "What?").await.unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_ask_rebuilds_missing_csv_table() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos");
        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();

        let db_path = dir.path().join("csv_dbs").join("repos.csv.db");
        std::fs::remove_file(&db_path).unwrap();

        match service.ask("repos.csv", "count").await.unwrap() {
            AskResponse::Csv { assistant, .. } => assert_eq!(assistant, "The answer is **3**."),
            other => panic!("unexpected answer {:?}", other),
        }
        assert!(db_path.is_file());
    }

    #[tokio::test]
    async fn test_delete_removes_vector_index() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT 1");
        service
            .upload("langs.txt", "txt", b"Rust and Python".to_vec())
            .await
            .unwrap();
        service.ask("langs.txt", "What is Rust?").await.unwrap();

        let vect_dir = dir.path().join("vectorstores").join("langs.txt");
        assert!(vect_dir.is_dir());

        assert!(service.delete("langs.txt").await);
        assert!(!vect_dir.exists());
        assert!(!dir.path().join("uploaded_files").join("langs.txt").exists());
        assert!(service.chat("langs.txt").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos");
        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();
        service.ask("repos.csv", "count").await.unwrap();

        assert!(service.delete("repos.csv").await);
        assert!(service.list().unwrap().is_empty());
        assert!(service.chat("repos.csv").unwrap().is_empty());
        assert!(!dir.path().join("csv_dbs").join("repos.csv.db").exists());
        assert!(!service.delete("../etc").await);
    }

    #[tokio::test]
    async fn test_locks_released_for_deleted_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos");
        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();
        assert!(service.locks.contains_key("repos.csv"));

        assert!(service.delete("repos.csv").await);
        assert!(!service.locks.contains_key("repos.csv"));

        for i in 0..5 {
            let name = format!("ghost{}.pdf", i);
            assert!(service.ask(&name, "?").await.is_err());
            assert!(service.activate(&name).await.is_err());
        }
        assert!(service.locks.is_empty());
    }

    #[tokio::test]
    async fn test_clear_chat() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), "SELECT COUNT(*) FROM repos");
        service.upload("repos.csv", "csv", CSV.to_vec()).await.unwrap();
        service.ask("repos.csv", "count").await.unwrap();

        service.clear_chat("repos.csv").await.unwrap();
        assert!(service.chat("repos.csv").unwrap().is_empty());
    }

    #[test]
    fn test_mode_and_extension() {
        assert_eq!(CollectionMode::from_ext("CSV"), CollectionMode::Csv);
        assert_eq!(CollectionMode::from_ext("url"), CollectionMode::Rag);
        assert_eq!(extension_of("report.final.PDF"), "pdf");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn test_response_shapes() {
        let upload = UploadResponse {
            saved_name: "a.txt".to_string(),
            filename: "a.txt".to_string(),
            ext: "txt".to_string(),
            activation: Activation::Rag {
                vect_dir: "data/vectorstores/a.txt".to_string(),
            },
        };
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["mode"], "rag");
        assert_eq!(json["vect_dir"], "data/vectorstores/a.txt");
        assert_eq!(json["saved_name"], "a.txt");

        let ask = serde_json::to_value(AskResponse::Rag {
            answer: "I don't know".to_string(),
        })
        .unwrap();
        assert_eq!(ask, serde_json::json!({"mode": "rag", "answer": "I don't know"}));
    }
}
