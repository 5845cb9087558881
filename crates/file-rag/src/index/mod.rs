//! Vector index construction with deterministic, content-hashed chunk ids

mod store;

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ingestion::{LoadedDocument, TextChunker};
use crate::providers::EmbeddingProvider;

pub use store::{cosine_similarity, IndexRecord, SearchHit, VectorIndex};

/// What a build changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// New ids embedded and inserted
    pub inserted: usize,
    /// Existing ids whose content changed and were re-embedded
    pub updated: usize,
    /// Existing ids with identical content, left untouched
    pub unchanged: usize,
    /// Ids from a longer previous build that were removed
    pub removed: usize,
    /// Chunks stored after the build
    pub total: usize,
}

/// Chunks documents, embeds them and upserts them into a collection's index
pub struct IndexManager {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexManager {
    pub fn new(chunker: TextChunker, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { chunker, embedder }
    }

    /// Build or refresh the index in `dir`; chunk ids are `{collection}_{n}`, 1-based
    pub async fn build(
        &self,
        docs: &[LoadedDocument],
        dir: &Path,
        collection: &str,
    ) -> Result<(VectorIndex, UpsertStats)> {
        let chunks = self.chunker.chunk_documents(docs);

        let dir_owned = dir.to_path_buf();
        let (index, existing) = tokio::task::spawn_blocking(move || -> Result<_> {
            let index = VectorIndex::open(&dir_owned)?;
            let existing = index.content_hashes()?;
            Ok((index, existing))
        })
        .await??;

        let mut stats = UpsertStats {
            total: chunks.len(),
            ..UpsertStats::default()
        };
        let mut pending = Vec::new();
        let mut current_ids = HashSet::new();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let seq = i + 1;
            let id = format!("{}_{}", collection, seq);
            let content_hash = hash_content(&chunk.content);
            current_ids.insert(id.clone());

            match existing.get(&id) {
                Some(hash) if *hash == content_hash => {
                    stats.unchanged += 1;
                    continue;
                }
                Some(_) => stats.updated += 1,
                None => stats.inserted += 1,
            }

            pending.push(IndexRecord {
                id,
                seq,
                content: chunk.content,
                source: chunk.source,
                page: chunk.page,
                content_hash,
                embedding: Vec::new(),
            });
        }

        let stale_ids: Vec<String> = existing
            .keys()
            .filter(|id| !current_ids.contains(*id))
            .cloned()
            .collect();
        stats.removed = stale_ids.len();

        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|r| r.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != pending.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} embeddings for {} chunks",
                    self.embedder.name(),
                    embeddings.len(),
                    pending.len()
                )));
            }
            for (record, embedding) in pending.iter_mut().zip(embeddings) {
                record.embedding = embedding;
            }
        }

        if !pending.is_empty() || !stale_ids.is_empty() {
            let writer = index.clone();
            tokio::task::spawn_blocking(move || writer.apply(&pending, &stale_ids)).await??;
        }

        tracing::info!(
            "Indexed '{}': {} chunks ({} new, {} updated, {} unchanged, {} removed)",
            collection,
            stats.total,
            stats.inserted,
            stats.updated,
            stats.unchanged,
            stats.removed
        );

        Ok((index, stats))
    }
}

/// SHA-256 hex digest of chunk content
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as (length, vowel count) and counts embedded texts
    struct CountingEmbedder {
        embedded: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embedded.fetch_add(1, Ordering::SeqCst);
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32 + 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn doc(content: &str) -> LoadedDocument {
        LoadedDocument {
            content: content.to_string(),
            source: "notes.txt".to_string(),
            page: None,
        }
    }

    fn manager() -> (Arc<CountingEmbedder>, IndexManager) {
        let embedder = Arc::new(CountingEmbedder {
            embedded: AtomicUsize::new(0),
        });
        let manager = IndexManager::new(TextChunker::new(20, 0), embedder.clone());
        (embedder, manager)
    }

    #[tokio::test]
    async fn test_rebuild_unchanged_keeps_count_and_skips_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let (embedder, manager) = manager();
        let docs = vec![doc("alpha beta gamma delta epsilon zeta eta theta")];

        let (index, first) = manager.build(&docs, dir.path(), "notes").await.unwrap();
        let count = index.count().unwrap();
        assert!(count > 1);
        assert_eq!(first.inserted, count);
        let embedded = embedder.embedded.load(Ordering::SeqCst);

        let (index, second) = manager.build(&docs, dir.path(), "notes").await.unwrap();
        assert_eq!(index.count().unwrap(), count);
        assert_eq!(second.unchanged, count);
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), embedded);
    }

    #[tokio::test]
    async fn test_changed_content_is_reembedded_and_extra_ids_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (_embedder, manager) = manager();

        manager
            .build(&[doc("one two three four five six seven eight nine ten")], dir.path(), "n")
            .await
            .unwrap();
        let (index, stats) = manager.build(&[doc("eleven")], dir.path(), "n").await.unwrap();

        assert_eq!(stats.updated, 1);
        assert!(stats.removed > 0);
        assert_eq!(index.count().unwrap(), 1);
        let hits = index.search(&[6.0, 3.0], 3).unwrap();
        assert_eq!(hits[0].id, "n_1");
        assert_eq!(hits[0].content, "eleven");
    }

    #[test]
    fn test_hash_content() {
        assert_eq!(
            hash_content("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
