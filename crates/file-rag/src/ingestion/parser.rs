//! Text extraction for PDF, DOCX, plain text and HTML

use scraper::Html;

use crate::error::{Error, Result};

/// Parsed document split into page-level segments
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Page-level content; non-paginated formats produce a single segment
    pub pages: Vec<PageContent>,
}

impl ParsedDocument {
    fn single(content: String) -> Self {
        Self {
            pages: vec![PageContent {
                page_number: None,
                content,
            }],
        }
    }

    /// Full text with pages joined by blank lines
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Whether no segment carries any text
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.content.trim().is_empty())
    }
}

/// Content from a single page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page number (1-indexed), when the format has pages
    pub page_number: Option<u32>,
    /// Text content of the page
    pub content: String,
}

/// Multi-format file parser
pub struct FileParser;

impl FileParser {
    /// Parse PDF bytes, one segment per page
    pub fn parse_pdf(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let pages = match Self::extract_pdf_pages(data) {
            Ok(pages) if pages.iter().any(|p| !p.content.is_empty()) => pages,
            Ok(_) => {
                tracing::warn!("lopdf found no page text in '{}', trying pdf-extract", filename);
                Self::extract_pdf_whole(filename, data)?
            }
            Err(e) => {
                tracing::warn!("lopdf failed on '{}': {}, trying pdf-extract", filename, e);
                Self::extract_pdf_whole(filename, data)?
            }
        };

        let parsed = ParsedDocument { pages };
        if parsed.is_empty() {
            return Err(Error::file_parse(
                filename,
                "No text content could be extracted from PDF",
            ));
        }
        Ok(parsed)
    }

    fn extract_pdf_pages(data: &[u8]) -> std::result::Result<Vec<PageContent>, lopdf::Error> {
        let doc = lopdf::Document::load_mem(data)?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            let text = match doc.extract_text(&[*page_number]) {
                Ok(text) => clean_text(&text),
                Err(e) => {
                    tracing::debug!("Could not extract page {}: {}", page_number, e);
                    String::new()
                }
            };
            pages.push(PageContent {
                page_number: Some(*page_number),
                content: text,
            });
        }
        Ok(pages)
    }

    fn extract_pdf_whole(filename: &str, data: &[u8]) -> Result<Vec<PageContent>> {
        let text = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("Failed to read PDF: {}", e)))?;

        Ok(vec![PageContent {
            page_number: Some(1),
            content: clean_text(&text),
        }])
    }

    /// Parse DOCX bytes into paragraph text
    pub fn parse_docx(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut content = String::new();
        for child in doc.document.children {
            if let docx_rs::DocumentChild::Paragraph(p) = child {
                for child in p.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                content.push_str(&t.text);
                            }
                        }
                    }
                }
                content.push('\n');
            }
        }

        Ok(ParsedDocument::single(content.trim_end().to_string()))
    }

    /// Plain text; invalid UTF-8 is replaced rather than rejected
    pub fn parse_text(data: &[u8]) -> ParsedDocument {
        ParsedDocument::single(String::from_utf8_lossy(data).to_string())
    }

    /// Visible text of an HTML page, one line per text node
    pub fn parse_html(html: &str) -> ParsedDocument {
        ParsedDocument::single(html_to_text(html))
    }
}

/// Visible text of an HTML document, skipping script and style content
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

/// Strip NUL bytes, trim lines and drop empty ones
fn clean_text(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
