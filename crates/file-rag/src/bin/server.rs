//! file-rag server binary
//!
//! Run with: cargo run -p file-rag --bin file-rag-server

use std::path::PathBuf;

use file_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         file-rag                          ║
║        Document RAG and CSV-to-SQL Question Answering     ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config_path = std::env::var("FILE_RAG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("file-rag.toml"));
    let config = RagConfig::load(Some(&config_path))?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data dir: {}", config.storage.data_dir.display());
    tracing::info!(
        "  - LLM: {:?} / {}",
        config.llm.provider,
        config.llm.model
    );
    tracing::info!(
        "  - Embeddings: {:?} / {} ({} dims)",
        config.embeddings.provider,
        config.embeddings.model,
        config.embeddings.dimensions
    );
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    let server = RagServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Chat UI: http://{}/ui", server.address());
    println!("\nEndpoints:");
    println!("  POST   /upload                   - Upload a file (PDF, DOCX, TXT, URL, CSV)");
    println!("  GET    /collections              - List saved collections");
    println!("  POST   /activate                 - Prepare a collection for questions");
    println!("  POST   /ask                      - Ask a question");
    println!("  GET    /chat/{{saved_name}}        - Conversation history");
    println!("  POST   /clear_chat               - Clear conversation history");
    println!("  DELETE /collections/{{saved_name}} - Delete a collection");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
