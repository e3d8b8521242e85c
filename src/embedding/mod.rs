//! Document parsing, chunking, and embedding.
//!
//! This is the expensive, fallible step of ingestion: it runs to
//! completion (or failure) before any persistent-store writes happen.
//! Ingestion and query embedding share one backend; embeddings from
//! different backends are not comparable and must never be mixed.

mod chunker;
mod extract;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Chunk, ChunkMetadata, DocMeta, DocumentKind, EmbeddedChunk};

pub use chunker::Chunker;
pub use extract::{extract, Extraction, ExtractionError};

/// Errors from the embedding backend.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding connection error: {0}")]
    Connection(String),

    #[error("embedding API error: {0}")]
    Api(String),

    #[error("embedding response parse error: {0}")]
    Parse(String),
}

/// Errors from the parse/split/embed pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("background task failed: {0}")]
    Join(String),
}

/// An embedding backend: text in, vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Parse("backend returned no embedding".to_string()))
    }
}

/// Embedding client for an Ollama-compatible backend.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    client: Client,
}

/// Ollama embed API request format.
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Ollama embed API response format.
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// Create a new embedder against `endpoint` using `model`.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| EmbedError::Connection(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    /// Check if the embedding service is reachable.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.endpoint);
        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        debug!("embedding {} texts with {}", texts.len(), self.model);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EmbedError::Api(format!("HTTP {}", resp.status())));
        }

        let parsed: OllamaEmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Parse(e.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

/// A parsed document ready for indexing.
pub struct ProcessedDocument {
    /// Parser-derived metadata.
    pub meta: DocMeta,
    /// Embedded chunks in document order.
    pub chunks: Vec<EmbeddedChunk>,
}

/// Parses a blob, splits it into retrieval-sized chunks, and obtains an
/// embedding per chunk.
pub struct ChunkingEmbedder {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl ChunkingEmbedder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunker: Chunker::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// The backend used for both ingestion and query embedding.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Run the full parse → split → embed pipeline for a stored blob.
    pub async fn process(
        &self,
        path: &Path,
        kind: DocumentKind,
        file_name: &str,
    ) -> Result<ProcessedDocument, PipelineError> {
        // Extraction shells out to parsers and reads files; keep it off
        // the async worker threads.
        let owned_path = path.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || extract(&owned_path, kind))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;

        let texts = self.chunker.split(&extraction.text);
        info!(
            "parsed {} into {} chunks (kind: {})",
            file_name,
            texts.len(),
            kind.as_str()
        );

        let vectors = self.embedder.embed_batch(&texts).await?;

        let metadata = ChunkMetadata {
            file_name: file_name.to_string(),
            file_type: kind.as_str().to_string(),
        };
        let chunks = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, embedding)| EmbeddedChunk {
                chunk: Chunk {
                    text,
                    metadata: metadata.clone(),
                },
                embedding,
            })
            .collect();

        Ok(ProcessedDocument {
            meta: extraction.meta,
            chunks,
        })
    }
}
