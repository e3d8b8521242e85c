//! Ragdex - document ingestion and semantic retrieval service.
//!
//! Uploads are content-addressed and deduplicated, parsed into chunks,
//! embedded through an external embedding backend, and indexed for
//! per-document similarity search with relevance-threshold filtering.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod hashing;
pub mod key_index;
pub mod models;
pub mod repository;
pub mod server;
pub mod services;
pub mod storage;
pub mod vector;
