//! SQLite-backed metadata store.
//!
//! Connections are opened per logical operation and closed on drop, so
//! no handle outlives a request. Multi-table writes (document upserts
//! with their tag relation) run inside a single transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{error, warn};

use super::{parse_datetime, EntityKind, Page, Paging, Record, Result, StoreError};
use crate::models::{Category, DocumentKind, DocumentRecord, Tag, User};

/// Relational store for categories, tags, documents, and users.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    db_path: PathBuf,
}

impl MetadataStore {
    /// Open (and initialize, if needed) the store at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Database file location.
    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                alias TEXT
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT
            );
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                kind TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                user_id INTEGER REFERENCES users(id),
                title TEXT,
                page_count INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS document_tags (
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (document_id, tag_id)
            );
            INSERT OR IGNORE INTO categories (id, name) VALUES (1, 'general');
            INSERT OR IGNORE INTO users (id, name) VALUES (1, 'admin');",
        )?;
        Ok(())
    }

    /// Count rows for an entity kind.
    pub fn count(&self, kind: EntityKind) -> Result<u64> {
        let conn = self.connect()?;
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let total: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(|err| {
            error!("error on count {}: {}", kind, err);
            err
        })?;
        Ok(total as u64)
    }

    /// Fetch the first row, optionally constrained to an id.
    pub fn find_first(&self, kind: EntityKind, id: Option<&str>) -> Result<Option<Record>> {
        match id {
            Some(id) => self.find_unique(kind, id),
            None => {
                let page = self.find_many(
                    kind,
                    Paging {
                        page_size: 1,
                        page_num: 0,
                    },
                )?;
                Ok(page.and_then(|p| p.list.into_iter().next()))
            }
        }
    }

    /// Fetch a single row by primary key.
    pub fn find_unique(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let conn = self.connect()?;
        let found = match kind {
            EntityKind::Category => conn
                .query_row(
                    "SELECT id, name FROM categories WHERE id = ?1",
                    params![int_id(kind, id)?],
                    row_to_category,
                )
                .optional()?
                .map(Record::Category),
            EntityKind::Tag => conn
                .query_row(
                    "SELECT id, name, alias FROM tags WHERE id = ?1",
                    params![int_id(kind, id)?],
                    row_to_tag,
                )
                .optional()?
                .map(Record::Tag),
            EntityKind::User => conn
                .query_row(
                    "SELECT id, name, email FROM users WHERE id = ?1",
                    params![int_id(kind, id)?],
                    row_to_user,
                )
                .optional()?
                .map(Record::User),
            EntityKind::Document => {
                let doc = conn
                    .query_row(
                        "SELECT * FROM documents WHERE id = ?1",
                        params![id],
                        row_to_document,
                    )
                    .optional()?;
                match doc {
                    Some(mut doc) => {
                        doc.tags = load_tags(&conn, &doc.id)?;
                        Some(Record::Document(doc))
                    }
                    None => None,
                }
            }
        };
        Ok(found)
    }

    /// Fetch a page of rows. The total is counted first; an empty table
    /// short-circuits to `Ok(None)` without issuing the list query.
    pub fn find_many(&self, kind: EntityKind, paging: Paging) -> Result<Option<Page>> {
        let total = self.count(kind)?;
        if total == 0 {
            warn!("no data in {}", kind.table());
            return Ok(None);
        }

        let conn = self.connect()?;
        let limit = paging.page_size as i64;
        let offset = paging.page_num as i64;
        let list = match kind {
            EntityKind::Category => {
                let mut stmt =
                    conn.prepare("SELECT id, name FROM categories ORDER BY id LIMIT ?1 OFFSET ?2")?;
                let rows = stmt
                    .query_map(params![limit, offset], row_to_category)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.into_iter().map(Record::Category).collect()
            }
            EntityKind::Tag => {
                let mut stmt = conn
                    .prepare("SELECT id, name, alias FROM tags ORDER BY id LIMIT ?1 OFFSET ?2")?;
                let rows = stmt
                    .query_map(params![limit, offset], row_to_tag)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.into_iter().map(Record::Tag).collect()
            }
            EntityKind::User => {
                let mut stmt = conn
                    .prepare("SELECT id, name, email FROM users ORDER BY id LIMIT ?1 OFFSET ?2")?;
                let rows = stmt
                    .query_map(params![limit, offset], row_to_user)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.into_iter().map(Record::User).collect()
            }
            EntityKind::Document => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM documents ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                let docs: Vec<DocumentRecord> = stmt
                    .query_map(params![limit, offset], row_to_document)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut records = Vec::with_capacity(docs.len());
                for mut doc in docs {
                    doc.tags = load_tags(&conn, &doc.id)?;
                    records.push(Record::Document(doc));
                }
                records
            }
        };

        Ok(Some(Page { list, total }))
    }

    /// Insert or update a record, returning it with its id filled in.
    ///
    /// Document records rebuild their tag relation wholesale: the
    /// existing relation rows are dropped and rewritten from the
    /// incoming tag list with a connect-or-create rule per tag. For
    /// other kinds, presence of an `id` selects update vs. create.
    pub fn save_or_update(&self, record: Record) -> Result<Record> {
        let kind = record.kind();
        let mut conn = self.connect()?;
        let result = (|| -> Result<Record> {
            match record {
                Record::Category(category) => {
                    let id = upsert_simple(
                        &conn,
                        category.id,
                        "INSERT INTO categories (name) VALUES (?1)",
                        "INSERT INTO categories (id, name) VALUES (?1, ?2)
                         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                        params![category.name],
                        params![category.id, category.name],
                    )?;
                    Ok(Record::Category(Category {
                        id: Some(id),
                        ..category
                    }))
                }
                Record::Tag(tag) => {
                    let id = upsert_simple(
                        &conn,
                        tag.id,
                        "INSERT INTO tags (name, alias) VALUES (?1, ?2)",
                        "INSERT INTO tags (id, name, alias) VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET name = excluded.name, alias = excluded.alias",
                        params![tag.name, tag.alias],
                        params![tag.id, tag.name, tag.alias],
                    )?;
                    Ok(Record::Tag(Tag {
                        id: Some(id),
                        ..tag
                    }))
                }
                Record::User(user) => {
                    let id = upsert_simple(
                        &conn,
                        user.id,
                        "INSERT INTO users (name, email) VALUES (?1, ?2)",
                        "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email",
                        params![user.name, user.email],
                        params![user.id, user.name, user.email],
                    )?;
                    Ok(Record::User(User {
                        id: Some(id),
                        ..user
                    }))
                }
                Record::Document(doc) => {
                    let tx = conn.transaction()?;
                    let doc = upsert_document(&tx, doc)?;
                    tx.commit()?;
                    Ok(Record::Document(doc))
                }
            }
        })();

        result.map_err(|err| {
            error!("error on save_or_update {}: {}", kind, err);
            err
        })
    }

    /// Insert multiple records, returning them with ids filled in.
    pub fn create_many(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        records
            .into_iter()
            .map(|record| {
                // Strip incoming ids so every row is a create.
                let record = match record {
                    Record::Category(c) => Record::Category(Category { id: None, ..c }),
                    Record::Tag(t) => Record::Tag(Tag { id: None, ..t }),
                    Record::User(u) => Record::User(User { id: None, ..u }),
                    other @ Record::Document(_) => other,
                };
                self.save_or_update(record)
            })
            .collect()
    }

    /// Delete rows by primary key. The only supported delete shape; other
    /// operations do not exist on this store by design.
    pub fn delete_many(&self, kind: EntityKind, ids: &[String]) -> Result<bool> {
        let conn = self.connect()?;
        let mut affected = 0usize;
        for id in ids {
            let rows = match kind {
                EntityKind::Document => conn.execute(
                    "DELETE FROM documents WHERE id = ?1",
                    params![id.as_str()],
                )?,
                EntityKind::Category => conn.execute(
                    "DELETE FROM categories WHERE id = ?1",
                    params![int_id(kind, id)?],
                )?,
                EntityKind::Tag => {
                    conn.execute("DELETE FROM tags WHERE id = ?1", params![int_id(kind, id)?])?
                }
                EntityKind::User => conn.execute(
                    "DELETE FROM users WHERE id = ?1",
                    params![int_id(kind, id)?],
                )?,
            };
            affected += rows;
        }
        Ok(affected > 0)
    }
}

/// Parse a string id for an integer-keyed table.
fn int_id(kind: EntityKind, id: &str) -> Result<i64> {
    id.parse::<i64>()
        .map_err(|_| StoreError::InvalidId(format!("{} ({})", id, kind)))
}

/// Create-or-upsert helper for the integer-keyed entity tables.
fn upsert_simple(
    conn: &Connection,
    id: Option<i64>,
    insert_sql: &str,
    upsert_sql: &str,
    insert_params: &[&dyn rusqlite::ToSql],
    upsert_params: &[&dyn rusqlite::ToSql],
) -> Result<i64> {
    match id {
        Some(id) => {
            conn.execute(upsert_sql, upsert_params)?;
            Ok(id)
        }
        None => {
            conn.execute(insert_sql, insert_params)?;
            Ok(conn.last_insert_rowid())
        }
    }
}

/// Upsert a document row and rewrite its tag relation from the payload.
fn upsert_document(tx: &Transaction<'_>, mut doc: DocumentRecord) -> Result<DocumentRecord> {
    let now = Utc::now();
    tx.execute(
        "INSERT INTO documents
            (id, file_path, file_name, file_size, kind, category_id, user_id,
             title, page_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(id) DO UPDATE SET
            file_path = excluded.file_path,
            file_name = excluded.file_name,
            file_size = excluded.file_size,
            kind = excluded.kind,
            category_id = excluded.category_id,
            user_id = excluded.user_id,
            title = excluded.title,
            page_count = excluded.page_count,
            updated_at = excluded.updated_at",
        params![
            doc.id,
            doc.file_path.to_string_lossy(),
            doc.file_name,
            doc.file_size as i64,
            doc.kind.as_str(),
            doc.category_id,
            doc.user_id,
            doc.title,
            doc.page_count,
            now.to_rfc3339(),
        ],
    )?;

    // The relation is rewritten entirely from the request payload; no
    // partial merge with whatever was there before.
    tx.execute(
        "DELETE FROM document_tags WHERE document_id = ?1",
        params![doc.id],
    )?;

    let mut resolved = Vec::with_capacity(doc.tags.len());
    for tag in doc.tags.drain(..) {
        let tag_id = reconcile_tag(tx, &tag)?;
        tx.execute(
            "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
            params![doc.id, tag_id],
        )?;
        resolved.push(Tag {
            id: Some(tag_id),
            ..tag
        });
    }
    doc.tags = resolved;
    doc.updated_at = now;
    Ok(doc)
}

/// Connect-or-create: an existing tag id connects to its row; a tag
/// without a persisted id (or with an id that no longer exists) is
/// created fresh.
fn reconcile_tag(tx: &Transaction<'_>, tag: &Tag) -> Result<i64> {
    if let Some(id) = tag.id {
        let exists: Option<i64> = tx
            .query_row("SELECT id FROM tags WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(id) = exists {
            return Ok(id);
        }
    }
    tx.execute(
        "INSERT INTO tags (name, alias) VALUES (?1, ?2)",
        params![tag.name, tag.alias],
    )?;
    Ok(tx.last_insert_rowid())
}

fn load_tags(conn: &Connection, document_id: &str) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.alias FROM tags t
         JOIN document_tags dt ON dt.tag_id = t.id
         WHERE dt.document_id = ?1
         ORDER BY t.id",
    )?;
    let tags = stmt
        .query_map(params![document_id], row_to_tag)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: Some(row.get("id")?),
        name: row.get("name")?,
    })
}

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        alias: row.get(2)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        email: row.get("email")?,
    })
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let kind: String = row.get("kind")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;
    let file_path: String = row.get("file_path")?;
    let file_size: i64 = row.get("file_size")?;
    Ok(DocumentRecord {
        id: row.get("id")?,
        file_path: file_path.into(),
        file_name: row.get("file_name")?,
        file_size: file_size as u64,
        kind: DocumentKind::from_extension(&kind).unwrap_or(DocumentKind::Text),
        category_id: row.get("category_id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        page_count: row.get("page_count")?,
        tags: Vec::new(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMeta;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, MetadataStore) {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta.db")).unwrap();
        (dir, store)
    }

    fn sample_document(id: &str, tags: Vec<Tag>) -> DocumentRecord {
        DocumentRecord::new(
            id.to_string(),
            format!("/uploads/{}.txt", id).into(),
            "report.txt".to_string(),
            128,
            DocumentKind::Text,
            1,
            tags,
            DocMeta {
                title: Some("Report".to_string()),
                page_count: None,
            },
        )
    }

    #[test]
    fn test_seeded_defaults_exist() {
        let (_dir, store) = store();
        assert_eq!(store.count(EntityKind::Category).unwrap(), 1);
        assert_eq!(store.count(EntityKind::User).unwrap(), 1);
    }

    #[test]
    fn test_find_many_short_circuits_on_empty_table() {
        let (_dir, store) = store();
        assert!(store
            .find_many(EntityKind::Tag, Paging::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_create_and_find_category() {
        let (_dir, store) = store();
        let created = store
            .save_or_update(Record::Category(Category {
                id: None,
                name: "contracts".to_string(),
            }))
            .unwrap();
        let Record::Category(category) = created else {
            panic!("expected category back");
        };
        let id = category.id.unwrap();

        let found = store
            .find_unique(EntityKind::Category, &id.to_string())
            .unwrap()
            .unwrap();
        let Record::Category(found) = found else {
            panic!("expected category");
        };
        assert_eq!(found.name, "contracts");
    }

    #[test]
    fn test_document_upsert_with_tag_reconciliation() {
        let (_dir, store) = store();

        // Persist one tag up front so it can be connected by id.
        let Record::Tag(existing) = store
            .save_or_update(Record::Tag(Tag::named("finance")))
            .unwrap()
        else {
            panic!("expected tag");
        };
        let existing_id = existing.id.unwrap();

        let doc = sample_document(
            &"a".repeat(64),
            vec![
                Tag::existing(existing_id),
                Tag {
                    id: Some(9999),
                    name: "quarterly".to_string(),
                    alias: None,
                },
            ],
        );
        let Record::Document(saved) = store.save_or_update(Record::Document(doc)).unwrap() else {
            panic!("expected document");
        };

        // Existing id connected as-is; stale id 9999 created fresh.
        assert_eq!(saved.tags[0].id, Some(existing_id));
        assert!(saved.tags[1].id.is_some());
        assert_ne!(saved.tags[1].id, Some(9999));
    }

    #[test]
    fn test_tag_relation_is_rewritten_not_merged() {
        let (_dir, store) = store();
        let doc_id = "b".repeat(64);

        let first = sample_document(&doc_id, vec![Tag::named("one"), Tag::named("two")]);
        store.save_or_update(Record::Document(first)).unwrap();

        let second = sample_document(&doc_id, vec![Tag::named("three")]);
        store.save_or_update(Record::Document(second)).unwrap();

        let Record::Document(found) = store
            .find_unique(EntityKind::Document, &doc_id)
            .unwrap()
            .unwrap()
        else {
            panic!("expected document");
        };
        // The relation set exactly equals the latest payload.
        assert_eq!(found.tags.len(), 1);
        assert_eq!(found.tags[0].name, "three");
    }

    #[test]
    fn test_find_many_pagination() {
        let (_dir, store) = store();
        for i in 0..5 {
            store
                .save_or_update(Record::Tag(Tag::named(format!("tag-{}", i))))
                .unwrap();
        }

        let page = store
            .find_many(
                EntityKind::Tag,
                Paging {
                    page_size: 2,
                    page_num: 2,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.list.len(), 2);
    }

    #[test]
    fn test_delete_many_documents() {
        let (_dir, store) = store();
        let doc_id = "c".repeat(64);
        store
            .save_or_update(Record::Document(sample_document(&doc_id, vec![])))
            .unwrap();

        assert!(store
            .delete_many(EntityKind::Document, &[doc_id.clone()])
            .unwrap());
        assert!(store
            .find_unique(EntityKind::Document, &doc_id)
            .unwrap()
            .is_none());
        // Second delete finds nothing.
        assert!(!store.delete_many(EntityKind::Document, &[doc_id]).unwrap());
    }

    #[test]
    fn test_invalid_int_id_is_rejected() {
        let (_dir, store) = store();
        let err = store.find_unique(EntityKind::Tag, "not-a-number");
        assert!(matches!(err, Err(StoreError::InvalidId(_))));
    }

    #[test]
    fn test_create_many_strips_ids() {
        let (_dir, store) = store();
        let created = store
            .create_many(vec![
                Record::Tag(Tag {
                    id: Some(42),
                    name: "x".to_string(),
                    alias: None,
                }),
                Record::Tag(Tag::named("y")),
            ])
            .unwrap();
        assert_eq!(created.len(), 2);
        let Record::Tag(first) = &created[0] else {
            panic!("expected tag");
        };
        assert_ne!(first.id, Some(42));
    }
}
