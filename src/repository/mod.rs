//! Relational metadata persistence.
//!
//! All access goes through [`MetadataStore`], which dispatches on
//! [`EntityKind`] with exhaustive matching: an unknown entity kind is
//! unrepresentable, and unsupported kind/operation combinations fail to
//! compile instead of surfacing at runtime.

mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{Category, DocumentRecord, Tag, User};

pub use store::MetadataStore;

/// Errors from metadata store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid id '{0}' for entity kind")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The entity kinds the metadata store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Category,
    Tag,
    Document,
    User,
}

impl EntityKind {
    /// Underlying table for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Tag => "tags",
            Self::Document => "documents",
            Self::User => "users",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "Category",
            Self::Tag => "Tag",
            Self::Document => "Document",
            Self::User => "User",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of any persisted entity kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Record {
    Category(Category),
    Tag(Tag),
    Document(DocumentRecord),
    User(User),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Category(_) => EntityKind::Category,
            Self::Tag(_) => EntityKind::Tag,
            Self::Document(_) => EntityKind::Document,
            Self::User(_) => EntityKind::User,
        }
    }
}

/// Pagination: `(page_size, page_num)` applied as `(LIMIT, OFFSET)`.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub page_size: u32,
    pub page_num: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_num: 0,
        }
    }
}

/// A page of records plus the total row count.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub list: Vec<Record>,
    pub total: u64,
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
