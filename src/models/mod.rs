//! Data models for documents, tags, categories, and chunks.

mod document;
mod entity;

pub use document::{Chunk, ChunkMetadata, DocMeta, DocumentKind, DocumentRecord, EmbeddedChunk};
pub use entity::{Category, Tag, User};
