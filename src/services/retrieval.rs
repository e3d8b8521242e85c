//! Query path: embed, similarity-search, threshold-filter.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::embedding::{EmbedError, Embedder};
use crate::vector::{VectorError, VectorIndex};

/// The fixed response when no chunk clears the relevance threshold. A
/// miss is not an error; it is a typed "no result" answer.
pub const NO_MATCH_FALLBACK: &str = "Sorry, no relevant content was found.";

/// Errors from the retrieval path.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Vector(#[from] VectorError),

    /// The search engine itself reported a failure (distinct from
    /// "found nothing relevant").
    #[error("search failed: {reason}")]
    Engine { code: i32, reason: String },
}

/// Answers natural-language queries against one document's indexed chunks.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    relevance_threshold: f32,
    top_k: usize,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        relevance_threshold: f32,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            vectors,
            relevance_threshold,
            top_k,
        }
    }

    /// Search `document_id` for passages relevant to `input`.
    ///
    /// Returns the texts of candidates scoring above the threshold in
    /// engine ranking order, or exactly one fallback string when none
    /// clears it.
    pub async fn search(
        &self,
        input: &str,
        document_id: &str,
    ) -> Result<Vec<String>, RetrievalError> {
        // Same backend as ingestion; vectors from different backends are
        // not comparable.
        let query_vector = self.embedder.embed_query(input).await?;

        let outcome = self
            .vectors
            .search(document_id, &query_vector, self.top_k)
            .await?;

        if !outcome.status.is_ok() {
            warn!(
                "similarity search failed: code {} ({})",
                outcome.status.code, outcome.status.reason
            );
            return Err(RetrievalError::Engine {
                code: outcome.status.code,
                reason: outcome.status.reason,
            });
        }

        let valid_texts: Vec<String> = outcome
            .results
            .iter()
            .filter(|candidate| candidate.score > self.relevance_threshold)
            .map(|candidate| candidate.text.clone())
            .collect();

        if valid_texts.is_empty() {
            warn!(
                "no match for '{}' over threshold {}, scores: {:?}",
                input,
                self.relevance_threshold,
                outcome
                    .results
                    .iter()
                    .map(|c| c.score)
                    .collect::<Vec<_>>()
            );
            return Ok(vec![NO_MATCH_FALLBACK.to_string()]);
        }

        Ok(valid_texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::models::EmbeddedChunk;
    use crate::vector::{ScoredText, SearchOutcome, SearchStatus};

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Vector index double returning a canned outcome.
    struct StubIndex {
        outcome: Mutex<Option<SearchOutcome>>,
    }

    impl StubIndex {
        fn returning(outcome: SearchOutcome) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn upsert_chunks(
            &self,
            _document_id: &str,
            _chunks: &[EmbeddedChunk],
        ) -> Result<(), VectorError> {
            Ok(())
        }

        async fn search(
            &self,
            _document_id: &str,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<SearchOutcome, VectorError> {
            Ok(self
                .outcome
                .lock()
                .await
                .take()
                .expect("search called more than once"))
        }

        async fn delete_document(&self, _document_id: &str) -> Result<(), VectorError> {
            Ok(())
        }
    }

    fn scored(text: &str, score: f32) -> ScoredText {
        ScoredText {
            text: text.to_string(),
            score,
        }
    }

    fn service(outcome: SearchOutcome) -> RetrievalService {
        RetrievalService::new(
            Arc::new(StubEmbedder),
            Arc::new(StubIndex::returning(outcome)),
            0.35,
            5,
        )
    }

    #[tokio::test]
    async fn test_threshold_filter_keeps_passing_scores_in_order() {
        let outcome = SearchOutcome::ok(vec![
            scored("best", 0.5),
            scored("weak", 0.2),
            scored("good", 0.4),
        ]);
        let texts = service(outcome).search("question", "doc").await.unwrap();
        assert_eq!(texts, vec!["best".to_string(), "good".to_string()]);
    }

    #[tokio::test]
    async fn test_all_below_threshold_yields_single_fallback() {
        let outcome = SearchOutcome::ok(vec![
            scored("a", 0.35),
            scored("b", 0.1),
            scored("c", 0.0),
        ]);
        let texts = service(outcome).search("question", "doc").await.unwrap();
        assert_eq!(texts, vec![NO_MATCH_FALLBACK.to_string()]);
    }

    #[tokio::test]
    async fn test_empty_results_yield_fallback() {
        let texts = service(SearchOutcome::ok(vec![]))
            .search("question", "doc")
            .await
            .unwrap();
        assert_eq!(texts, vec![NO_MATCH_FALLBACK.to_string()]);
    }

    #[tokio::test]
    async fn test_engine_failure_propagates_reason() {
        let outcome = SearchOutcome {
            status: SearchStatus::failed(2, "collection not loaded"),
            results: vec![],
        };
        let err = service(outcome).search("question", "doc").await;
        match err {
            Err(RetrievalError::Engine { code, reason }) => {
                assert_eq!(code, 2);
                assert_eq!(reason, "collection not loaded");
            }
            other => panic!("expected engine failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_threshold_is_strictly_greater_than() {
        let outcome = SearchOutcome::ok(vec![scored("exact", 0.35), scored("above", 0.351)]);
        let texts = service(outcome).search("question", "doc").await.unwrap();
        assert_eq!(texts, vec!["above".to_string()]);
    }
}
