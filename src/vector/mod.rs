//! Vector index contract and backends.
//!
//! The pipeline needs exactly three things from a vector index: upsert
//! chunks for a document, similarity-search scoped to a document, and
//! delete a document's chunks. Engine-level search failures (the index
//! answered, but with an error status) are reported through
//! [`SearchOutcome::status`] and are distinct from transport errors.

mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddedChunk;

pub use http::HttpVectorIndex;
pub use memory::MemoryVectorIndex;

/// Errors reaching or driving the vector index.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector index connection error: {0}")]
    Connection(String),

    #[error("vector index rejected request: {0}")]
    Api(String),

    #[error("vector index response parse error: {0}")]
    Parse(String),
}

/// Engine-level status of a similarity search. Code 0 is success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStatus {
    pub code: i32,
    pub reason: String,
}

impl SearchStatus {
    pub fn ok() -> Self {
        Self {
            code: 0,
            reason: String::new(),
        }
    }

    pub fn failed(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// A scored candidate returned by similarity search, ranked by the engine.
#[derive(Debug, Clone)]
pub struct ScoredText {
    pub text: String,
    pub score: f32,
}

/// Result of a similarity search: engine status plus ranked candidates.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub results: Vec<ScoredText>,
}

impl SearchOutcome {
    pub fn ok(results: Vec<ScoredText>) -> Self {
        Self {
            status: SearchStatus::ok(),
            results,
        }
    }
}

/// Store of chunk embeddings answering similarity queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store embedded chunks for a document.
    async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), VectorError>;

    /// Top-K similarity search scoped to one document.
    async fn search(
        &self,
        document_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<SearchOutcome, VectorError>;

    /// Remove every chunk belonging to a document.
    async fn delete_document(&self, document_id: &str) -> Result<(), VectorError>;
}
