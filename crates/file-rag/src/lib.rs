//! file-rag: document RAG and CSV-to-SQL question answering
//!
//! Uploaded PDF, DOCX, TXT and URL files are chunked, embedded and indexed per
//! collection; questions are answered from retrieved chunks with conversation memory.
//! CSV uploads become SQLite tables and questions are translated to SQL.
//! The HTTP API and a browser chat UI are served by [`RagServer`].

pub mod collection;
pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod storage;

pub use collection::CollectionService;
pub use config::RagConfig;
pub use error::{Error, Result};
pub use providers::Providers;
pub use server::{state::AppState, RagServer};
