//! Ingestion orchestrator.
//!
//! Drives an upload through the pipeline:
//! `Received → Hashed → DedupChecked → {Reused | Stored} → Parsed →
//! Embedded → Indexed → Done`, with `Error` reachable from any step.
//! Parsing and embedding run to completion before any persistent-store
//! write; the key-index and metadata writes are issued concurrently and
//! must both succeed.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::embedding::{ChunkingEmbedder, PipelineError};
use crate::hashing;
use crate::key_index::{IndexError, KeyIndex};
use crate::models::{DocMeta, DocumentKind, DocumentRecord, Tag};
use crate::repository::{EntityKind, MetadataStore, Record, StoreError};
use crate::storage::{BlobStore, SpooledBlob, StorageError};
use crate::vector::{VectorError, VectorIndex};

/// Default category when an upload does not name one.
const DEFAULT_CATEGORY_ID: i64 = 1;

/// Errors from the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("invalid document id: {0}")]
    InvalidId(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("vector index write failed: {0}")]
    Vector(#[from] VectorError),

    #[error(transparent)]
    KeyIndex(#[from] IndexError),

    #[error(transparent)]
    Metadata(#[from] StoreError),

    #[error("index write failed: {0}")]
    IndexWrite(String),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Pipeline stages, traced as the state machine advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Hashed,
    DedupChecked,
    Reused,
    Stored,
    Embedded,
    Indexed,
    Done,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Hashed => "hashed",
            Self::DedupChecked => "dedup_checked",
            Self::Reused => "reused",
            Self::Stored => "stored",
            Self::Embedded => "embedded",
            Self::Indexed => "indexed",
            Self::Done => "done",
        }
    }
}

/// Upload parameters alongside the byte stream.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original filename of the upload; its extension selects the parser.
    pub file_name: String,
    /// Category association; the default category when absent.
    pub category_id: Option<i64>,
    /// Tags to reconcile onto the document.
    pub tags: Vec<Tag>,
}

/// What the caller gets back from a completed upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_hash: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

/// Outcome of an upload: freshly ingested, or deduplicated against an
/// existing blob (a success, distinct from `Ingested`).
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Ingested(UploadReceipt),
    AlreadyUploaded(UploadReceipt),
}

impl UploadOutcome {
    pub fn receipt(&self) -> &UploadReceipt {
        match self {
            Self::Ingested(receipt) | Self::AlreadyUploaded(receipt) => receipt,
        }
    }
}

/// Composes hashing, dedup, blob storage, parse/embed, and the index
/// writes into the upload and deletion paths.
pub struct IngestionService {
    blobs: BlobStore,
    key_index: KeyIndex,
    metadata: MetadataStore,
    pipeline: ChunkingEmbedder,
    vectors: Arc<dyn VectorIndex>,
    dev_mode: bool,
}

impl IngestionService {
    pub fn new(
        blobs: BlobStore,
        key_index: KeyIndex,
        metadata: MetadataStore,
        pipeline: ChunkingEmbedder,
        vectors: Arc<dyn VectorIndex>,
        dev_mode: bool,
    ) -> Self {
        Self {
            blobs,
            key_index,
            metadata,
            pipeline,
            vectors,
            dev_mode,
        }
    }

    /// The blob store, for callers that spool before ingesting.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Ingest an upload from a byte stream.
    pub async fn upload<S, E>(
        &self,
        request: UploadRequest,
        stream: S,
    ) -> Result<UploadOutcome, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let spooled = self.blobs.spool(stream).await?;
        self.ingest_spooled(request, spooled).await
    }

    /// Ingest an upload that has already been spooled (and thereby hashed).
    pub async fn ingest_spooled(
        &self,
        request: UploadRequest,
        spooled: SpooledBlob,
    ) -> Result<UploadOutcome, IngestError> {
        let Some(kind) = document_kind_of(&request.file_name) else {
            self.blobs.discard(spooled);
            return Err(IngestError::UnsupportedType(request.file_name));
        };

        let file_hash = spooled.hash().to_string();
        let file_size = spooled.size();
        self.trace(&file_hash, Stage::Hashed);

        // Dedup check: blob existence is the authority here. Relational
        // and vector records are assumed consistent with the blob and are
        // not re-validated per call.
        let existing = self.blobs.find_existing(&file_hash);
        self.trace(&file_hash, Stage::DedupChecked);
        if let Some(existing) = existing {
            if !self.dev_mode {
                self.blobs.discard(spooled);
                self.trace(&file_hash, Stage::Reused);
                info!(
                    "file already uploaded: {} -> {}",
                    request.file_name,
                    existing.display()
                );
                return Ok(UploadOutcome::AlreadyUploaded(UploadReceipt {
                    file_hash,
                    file_name: request.file_name,
                    file_size,
                    title: None,
                    page_count: None,
                }));
            }
        }

        let blob_path = self.blobs.commit(spooled, kind.extension())?;
        self.trace(&file_hash, Stage::Stored);

        // Parse, split, and embed before touching any persistent store.
        // Failure here aborts the ingestion and cleans up the blob.
        let processed = match self
            .pipeline
            .process(&blob_path, kind, &request.file_name)
            .await
        {
            Ok(processed) => processed,
            Err(err) => {
                self.blobs.delete(&blob_path);
                return Err(err.into());
            }
        };
        self.trace(&file_hash, Stage::Embedded);

        if let Err(err) = self
            .vectors
            .upsert_chunks(&file_hash, &processed.chunks)
            .await
        {
            self.blobs.delete(&blob_path);
            return Err(err.into());
        }

        // Key-index and metadata writes go out together and are awaited
        // jointly; a succeeded write is not unwound if its sibling fails.
        let record = DocumentRecord::new(
            file_hash.clone(),
            blob_path.clone(),
            request.file_name.clone(),
            file_size,
            kind,
            request.category_id.unwrap_or(DEFAULT_CATEGORY_ID),
            request.tags,
            DocMeta {
                title: processed.meta.title.clone(),
                page_count: processed.meta.page_count,
            },
        );

        let key_index = self.key_index.clone();
        let key_hash = file_hash.clone();
        let key_value = blob_path.to_string_lossy().to_string();
        let key_write =
            tokio::task::spawn_blocking(move || key_index.put(&key_hash, key_value.as_str()));

        let metadata = self.metadata.clone();
        let metadata_write =
            tokio::task::spawn_blocking(move || metadata.save_or_update(Record::Document(record)));

        let (key_ret, metadata_ret) = tokio::join!(key_write, metadata_write);
        let key_ok = matches!(&key_ret, Ok(Ok(())));
        let metadata_ok = matches!(&metadata_ret, Ok(Ok(_)));

        if !key_ok || !metadata_ok {
            let mut failed = Vec::new();
            if !key_ok {
                failed.push("key index");
            }
            if !metadata_ok {
                failed.push("metadata store");
            }
            let failed = failed.join(" and ");
            error!(
                "error on saving document {}: {} write failed [key index: {}, metadata: {}]",
                file_hash,
                failed,
                key_ok,
                metadata_ok
            );
            return Err(IngestError::IndexWrite(failed.to_string()));
        }
        self.trace(&file_hash, Stage::Indexed);

        self.trace(&file_hash, Stage::Done);
        Ok(UploadOutcome::Ingested(UploadReceipt {
            file_hash,
            file_name: request.file_name,
            file_size,
            title: processed.meta.title,
            page_count: processed.meta.page_count,
        }))
    }

    /// Remove a document: metadata row, vector chunks, and key-index
    /// entry together, then best-effort blob removal. A missing blob is
    /// logged, not a failure of the delete.
    pub async fn delete_document(&self, id: &str) -> Result<(), IngestError> {
        if !hashing::is_content_hash(id) {
            return Err(IngestError::InvalidId(id.to_string()));
        }

        let metadata = self.metadata.clone();
        let lookup_id = id.to_string();
        let record = tokio::task::spawn_blocking(move || {
            metadata.find_unique(EntityKind::Document, &lookup_id)
        })
        .await
        .map_err(|e| IngestError::Join(e.to_string()))??;

        let Some(Record::Document(document)) = record else {
            return Err(IngestError::NotFound(id.to_string()));
        };

        let metadata = self.metadata.clone();
        let delete_id = id.to_string();
        let removed = tokio::task::spawn_blocking(move || {
            metadata.delete_many(EntityKind::Document, &[delete_id])
        })
        .await
        .map_err(|e| IngestError::Join(e.to_string()))??;
        if !removed {
            return Err(IngestError::NotFound(id.to_string()));
        }

        self.vectors.delete_document(id).await?;

        let key_index = self.key_index.clone();
        let key = id.to_string();
        tokio::task::spawn_blocking(move || key_index.delete(&key))
            .await
            .map_err(|e| IngestError::Join(e.to_string()))??;

        // Blob last; its absence is a cleanup condition, not an error.
        self.blobs.delete(&document.file_path);
        info!("document deleted: {}", id);
        Ok(())
    }

    fn trace(&self, hash: &str, stage: Stage) {
        tracing::debug!(document = hash, stage = stage.as_str(), "ingest stage");
    }
}

/// Document kind from an upload's filename extension.
fn document_kind_of(file_name: &str) -> Option<DocumentKind> {
    let extension = std::path::Path::new(file_name).extension()?.to_str()?;
    DocumentKind::from_extension(extension)
}
