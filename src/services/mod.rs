//! Service layer: the ingestion orchestrator and the retrieval path.
//!
//! Services hold the pipeline's collaborators and are shared by the
//! HTTP server and the CLI.

pub mod ingest;
pub mod retrieval;

pub use ingest::{IngestError, IngestionService, UploadOutcome, UploadReceipt, UploadRequest};
pub use retrieval::{RetrievalError, RetrievalService, NO_MATCH_FALLBACK};
