//! In-memory vector index.
//!
//! Cosine-similarity search over a per-document chunk map. Used by the
//! test suite and for index-less local runs; state dies with the
//! process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ScoredText, SearchOutcome, VectorError, VectorIndex};
use crate::models::EmbeddedChunk;

#[derive(Debug, Clone)]
struct StoredChunk {
    text: String,
    embedding: Vec<f32>,
}

/// Process-local vector index keyed by document id.
#[derive(Default)]
pub struct MemoryVectorIndex {
    chunks: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks for a document.
    pub async fn chunk_count(&self, document_id: &str) -> usize {
        self.chunks
            .read()
            .await
            .get(document_id)
            .map(|chunks| chunks.len())
            .unwrap_or(0)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), VectorError> {
        let mut map = self.chunks.write().await;
        let entry = map.entry(document_id.to_string()).or_default();
        for chunk in chunks {
            entry.push(StoredChunk {
                text: chunk.chunk.text.clone(),
                embedding: chunk.embedding.clone(),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        document_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<SearchOutcome, VectorError> {
        let map = self.chunks.read().await;
        let mut scored: Vec<ScoredText> = map
            .get(document_id)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|chunk| ScoredText {
                        text: chunk.text.clone(),
                        score: cosine_similarity(&chunk.embedding, vector),
                    })
                    .collect()
            })
            .unwrap_or_default();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(SearchOutcome::ok(scored))
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorError> {
        self.chunks.write().await.remove(document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn chunk(text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    file_name: "f.txt".to_string(),
                    file_type: "txt".to_string(),
                },
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        index
            .upsert_chunks(
                "doc",
                &[
                    chunk("exact", vec![1.0, 0.0]),
                    chunk("orthogonal", vec![0.0, 1.0]),
                    chunk("close", vec![0.9, 0.1]),
                ],
            )
            .await
            .unwrap();

        let outcome = index.search("doc", &[1.0, 0.0], 3).await.unwrap();
        assert!(outcome.status.is_ok());
        assert_eq!(outcome.results[0].text, "exact");
        assert_eq!(outcome.results[1].text, "close");
        assert_eq!(outcome.results[2].text, "orthogonal");
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_document() {
        let index = MemoryVectorIndex::new();
        index
            .upsert_chunks("doc-a", &[chunk("from a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert_chunks("doc-b", &[chunk("from b", vec![1.0, 0.0])])
            .await
            .unwrap();

        let outcome = index.search("doc-a", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].text, "from a");
    }

    #[tokio::test]
    async fn test_top_k_truncation() {
        let index = MemoryVectorIndex::new();
        let chunks: Vec<EmbeddedChunk> = (0..10)
            .map(|i| chunk(&format!("c{}", i), vec![1.0, i as f32 / 10.0]))
            .collect();
        index.upsert_chunks("doc", &chunks).await.unwrap();

        let outcome = index.search("doc", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_document_removes_chunks() {
        let index = MemoryVectorIndex::new();
        index
            .upsert_chunks("doc", &[chunk("text", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.chunk_count("doc").await, 1);

        index.delete_document("doc").await.unwrap();
        assert_eq!(index.chunk_count("doc").await, 0);
        let outcome = index.search("doc", &[1.0], 5).await.unwrap();
        assert!(outcome.results.is_empty());
    }
}
