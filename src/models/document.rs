//! Document models for content-addressed storage and retrieval.
//!
//! A document's identity is the SHA-256 hash of its bytes, which doubles
//! as the dedup key: re-ingesting identical content maps onto the same
//! record regardless of filename or upload time.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// Document kind derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Markdown,
    Text,
    Html,
    Csv,
    Json,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "md",
            Self::Text => "txt",
            Self::Html => "html",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::from_extension(s)
    }

    /// Map a file extension (without the dot) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::Text),
            "html" | "htm" => Some(Self::Html),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Extension used when storing a blob of this kind.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

/// Parser-derived metadata, opaque to the pipeline beyond persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeta {
    /// Document title (first heading or leading line).
    pub title: Option<String>,
    /// Page count, when the format has pages.
    pub page_count: Option<u32>,
}

/// A persisted document record.
///
/// `id` is the 64-char hex content hash and serves as both primary key
/// and dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Content hash of the document bytes.
    pub id: String,
    /// Where the blob is stored.
    pub file_path: PathBuf,
    /// Original upload filename.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Kind derived from the file extension.
    pub kind: DocumentKind,
    /// Single required category association.
    pub category_id: i64,
    /// Owning user, when known.
    pub user_id: Option<i64>,
    /// Parser-derived title.
    pub title: Option<String>,
    /// Parser-derived page count.
    pub page_count: Option<u32>,
    /// Tag associations; rebuilt wholesale on every upsert.
    pub tags: Vec<Tag>,
    /// When the document was first ingested.
    pub created_at: DateTime<Utc>,
    /// When the document was last upserted.
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a record for a freshly ingested blob.
    pub fn new(
        id: String,
        file_path: PathBuf,
        file_name: String,
        file_size: u64,
        kind: DocumentKind,
        category_id: i64,
        tags: Vec<Tag>,
        meta: DocMeta,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_path,
            file_name,
            file_size,
            kind,
            category_id,
            user_id: None,
            title: meta.title,
            page_count: meta.page_count,
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-chunk metadata carried into the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub file_type: String,
}

/// A retrieval-sized slice of a parsed document.
///
/// Chunks are derived data: produced fresh on every ingestion and only
/// persisted inside the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(
            DocumentKind::from_extension(".md"),
            Some(DocumentKind::Markdown)
        );
        assert_eq!(
            DocumentKind::from_extension("htm"),
            Some(DocumentKind::Html)
        );
        assert_eq!(DocumentKind::from_extension("exe"), None);
        assert_eq!(DocumentKind::from_extension(""), None);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            DocumentKind::Pdf,
            DocumentKind::Markdown,
            DocumentKind::Text,
            DocumentKind::Html,
            DocumentKind::Csv,
            DocumentKind::Json,
        ] {
            assert_eq!(DocumentKind::from_extension(kind.as_str()), Some(kind));
        }
    }
}
