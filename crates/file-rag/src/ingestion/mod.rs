//! Document ingestion: loading, parsing and chunking

mod chunker;
mod loader;
mod parser;

pub use chunker::{Chunk, TextChunker};
pub use loader::{DocumentLoader, LoadedDocument};
pub use parser::{html_to_text, FileParser, PageContent, ParsedDocument};
