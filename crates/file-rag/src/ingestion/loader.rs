//! Extension-based document loading

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use super::parser::{FileParser, ParsedDocument};

/// A loaded text segment (a page, or a whole document)
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Segment text
    pub content: String,
    /// File path or fetched URL
    pub source: String,
    /// Page number for paginated sources
    pub page: Option<u32>,
}

/// Loads uploaded files into text segments
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    client: reqwest::Client,
}

impl DocumentLoader {
    /// Create a loader whose URL fetches time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("file-rag/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Load a file, dispatching on `ext`; unknown extensions load as plain text
    pub async fn load(&self, path: &Path, ext: &str) -> Result<Vec<LoadedDocument>> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        let source = path.display().to_string();

        if ext == "url" {
            return self.load_url_file(path).await;
        }

        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.clone());

        let parsed = tokio::task::spawn_blocking(move || -> Result<ParsedDocument> {
            match ext.as_str() {
                "pdf" => FileParser::parse_pdf(&filename, &data),
                "docx" => FileParser::parse_docx(&filename, &data),
                _ => Ok(FileParser::parse_text(&data)),
            }
        })
        .await??;

        let docs = into_documents(parsed, &source);
        tracing::debug!("Loaded {} segment(s) from {}", docs.len(), source);
        Ok(docs)
    }

    /// The file holds a URL; fetch it and extract the page text
    async fn load_url_file(&self, path: &Path) -> Result<Vec<LoadedDocument>> {
        self.fetch_url_file(path)
            .await
            .map_err(|e| Error::Loader(format!("URL Loader Error: {}", e)))
    }

    async fn fetch_url_file(&self, path: &Path) -> Result<Vec<LoadedDocument>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let url = raw.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Loader("Invalid URL format".to_string()));
        }

        tracing::info!("Fetching {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;

        let parsed = FileParser::parse_html(&html);
        Ok(into_documents(parsed, url))
    }
}

fn into_documents(parsed: ParsedDocument, source: &str) -> Vec<LoadedDocument> {
    parsed
        .pages
        .into_iter()
        .filter(|p| !p.content.trim().is_empty())
        .map(|p| LoadedDocument {
            content: p.content,
            source: source.to_string(),
            page: p.page_number,
        })
        .collect()
}
