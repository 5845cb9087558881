//! Per-collection persistent vector index on SQLite
//!
//! Embeddings are stored as little-endian f32 blobs and searched by a linear
//! cosine-similarity scan, which is enough for single-document collections.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Index file inside a collection's vector directory
const INDEX_FILE: &str = "index.sqlite";

/// A chunk ready to be written to the index
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub seq: usize,
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A search match
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Persistent vector index for one collection
#[derive(Clone)]
pub struct VectorIndex {
    dir: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl VectorIndex {
    /// Open or create the index in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(INDEX_FILE))
            .map_err(|e| Error::vector_index(format!("Failed to open index: {}", e)))?;

        let index = Self {
            dir: dir.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        };
        index.migrate()?;
        Ok(index)
    }

    /// Open the index only if it has been built
    pub fn open_if_exists(dir: &Path) -> Result<Option<Self>> {
        if !dir.join(INDEX_FILE).is_file() {
            return Ok(None);
        }
        Self::open(dir).map(Some)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_seq ON chunks(seq);
            "#,
        )
        .map_err(|e| Error::vector_index(format!("Failed to initialize index: {}", e)))?;
        Ok(())
    }

    /// Directory holding the index
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of stored chunks
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Content hash of every stored chunk, keyed by id
    pub fn content_hashes(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, content_hash FROM chunks")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut hashes = HashMap::new();
        for row in rows {
            let (id, hash): (String, String) = row?;
            hashes.insert(id, hash);
        }
        Ok(hashes)
    }

    /// Insert or replace records and delete `stale_ids`, in one transaction
    pub fn apply(&self, records: &[IndexRecord], stale_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO chunks (id, seq, content, source, page, content_hash, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    seq = excluded.seq,
                    content = excluded.content,
                    source = excluded.source,
                    page = excluded.page,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding",
            )?;
            for record in records {
                upsert.execute(params![
                    record.id,
                    record.seq as i64,
                    record.content,
                    record.source,
                    record.page,
                    record.content_hash,
                    embedding_to_blob(&record.embedding),
                ])?;
            }

            let mut delete = tx.prepare("DELETE FROM chunks WHERE id = ?1")?;
            for id in stale_ids {
                delete.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Top `k` chunks by cosine similarity to `query`
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, content, source, page, embedding FROM chunks")?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(4)?;
            Ok((
                SearchHit {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    source: row.get(2)?,
                    page: row.get(3)?,
                    score: 0.0,
                },
                blob,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (mut hit, blob) = row?;
            let embedding = blob_to_embedding(&blob);
            if embedding.len() != query.len() {
                tracing::debug!(
                    "Skipping chunk {} with {} dims (query has {})",
                    hit.id,
                    embedding.len(),
                    query.len()
                );
                continue;
            }
            hit.score = cosine_similarity(query, &embedding);
            hits.push(hit);
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize, content: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: format!("doc_{}", n),
            seq: n,
            content: content.to_string(),
            source: "doc.txt".to_string(),
            page: None,
            content_hash: content.len().to_string(),
            embedding,
        }
    }

    #[test]
    fn test_open_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("doc.txt");
        assert!(VectorIndex::open_if_exists(&index_dir).unwrap().is_none());

        VectorIndex::open(&index_dir).unwrap();
        assert!(VectorIndex::open_if_exists(&index_dir).unwrap().is_some());
    }

    #[test]
    fn test_apply_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .apply(
                &[
                    record(1, "cats", vec![1.0, 0.0]),
                    record(2, "dogs", vec![0.0, 1.0]),
                    record(3, "both", vec![0.7, 0.7]),
                ],
                &[],
            )
            .unwrap();
        assert_eq!(index.count().unwrap(), 3);

        let hits = index.search(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "cats");
        assert_eq!(hits[1].content, "both");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_upsert_replaces_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();
        index
            .apply(&[record(1, "a", vec![1.0]), record(2, "b", vec![1.0])], &[])
            .unwrap();

        index
            .apply(&[record(1, "changed", vec![1.0])], &["doc_2".to_string()])
            .unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let hashes = index.content_hashes().unwrap();
        assert_eq!(hashes["doc_1"], "7");
    }

    #[test]
    fn test_blob_round_trip_and_cosine() {
        let embedding = vec![0.25, -1.5, 3.0];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&embedding)), embedding);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }
}
