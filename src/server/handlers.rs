//! API endpoint handlers.
//!
//! Validation failures never reach storage: they are rejected here with
//! `code: -1` and a specific message.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::AppState;
use crate::hashing;
use crate::models::Tag;
use crate::repository::{EntityKind, Paging};
use crate::services::{RetrievalError, UploadOutcome, UploadRequest};
use crate::storage::SpooledBlob;

/// The uniform response envelope.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse {
    pub code: i32,
    pub data: Value,
    pub message: String,
}

impl ApiResponse {
    fn ok(data: Value) -> Json<Self> {
        Json(Self {
            code: 0,
            data,
            message: "ok".to_string(),
        })
    }

    fn ok_with_message(data: Value, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: 0,
            data,
            message: message.into(),
        })
    }

    /// The dedup short-circuit: not an error, still a 2xx-class outcome.
    fn already_uploaded(data: Value) -> Json<Self> {
        Json(Self {
            code: 1,
            data,
            message: "file already uploaded".to_string(),
        })
    }

    fn fail(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: -1,
            data: Value::Null,
            message: message.into(),
        })
    }
}

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub size: Option<u32>,
    pub page: Option<u32>,
}

impl ListParams {
    fn paging(&self) -> Paging {
        Paging {
            page_size: self.size.unwrap_or(10),
            page_num: self.page.unwrap_or(0),
        }
    }
}

/// Parse the `tags` form field: a JSON array of `{id, name, alias}`
/// objects or bare numeric ids.
fn parse_tags(raw: &str) -> Vec<Tag> {
    let Ok(values) = serde_json::from_str::<Vec<Value>>(raw) else {
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(Tag {
                id: map.get("id").and_then(Value::as_i64),
                name: map
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                alias: map
                    .get("alias")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            Value::Number(id) => id.as_i64().map(Tag::existing),
            _ => None,
        })
        .collect()
}

/// Upload a document: multipart form with a required `file` field and
/// optional `category` (numeric id) and `tags` (JSON array).
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Json<ApiResponse> {
    let mut category_id: Option<i64> = None;
    let mut tags: Vec<Tag> = Vec::new();
    let mut spooled: Option<(SpooledBlob, String)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                error!("fileUpload multipart error: {}", err);
                return ApiResponse::fail(format!("malformed multipart request: {}", err));
            }
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                // Spool the stream now; multipart fields must be consumed
                // in order.
                let stream = Box::pin(futures::stream::unfold(field, |mut field| async move {
                    match field.chunk().await {
                        Ok(Some(bytes)) => Some((Ok(bytes), field)),
                        Ok(None) => None,
                        Err(err) => Some((Err(err), field)),
                    }
                }));
                match state.ingest.blobs().spool(stream).await {
                    Ok(blob) => spooled = Some((blob, file_name)),
                    Err(err) => {
                        error!("fileUpload spool error: {}", err);
                        return ApiResponse::fail(format!("upload failed: {}", err));
                    }
                }
            }
            Some("category") => {
                category_id = field.text().await.ok().and_then(|t| t.trim().parse().ok());
            }
            Some("tags") => {
                if let Ok(raw) = field.text().await {
                    tags = parse_tags(&raw);
                }
            }
            _ => {}
        }
    }

    let Some((blob, file_name)) = spooled else {
        return ApiResponse::fail("no parameter file upload");
    };

    let request = UploadRequest {
        file_name,
        category_id,
        tags,
    };
    match state.ingest.ingest_spooled(request, blob).await {
        Ok(UploadOutcome::Ingested(receipt)) => {
            let data = serde_json::to_value(&receipt).unwrap_or(Value::Null);
            ApiResponse::ok_with_message(data, "upload and save success")
        }
        Ok(UploadOutcome::AlreadyUploaded(receipt)) => {
            let data = serde_json::to_value(&receipt).unwrap_or(Value::Null);
            ApiResponse::already_uploaded(data)
        }
        Err(err) => {
            error!("fileUpload: {}", err);
            ApiResponse::fail(err.to_string())
        }
    }
}

/// Delete request body.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: Option<String>,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub kind: Option<String>,
}

/// Delete a document: metadata row, vector chunks, key-index entry, and
/// (best-effort) the blob.
pub async fn delete_document(
    State(state): State<AppState>,
    Json(body): Json<DeleteRequest>,
) -> Json<ApiResponse> {
    let Some(id) = body.id.filter(|id| !id.trim().is_empty()) else {
        return ApiResponse::fail("no file id found");
    };

    match state.ingest.delete_document(&id).await {
        Ok(()) => ApiResponse::ok(Value::Null),
        Err(err) => {
            error!("fileDelete: {}", err);
            ApiResponse::fail("delete failed")
        }
    }
}

/// Semantic search request body.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub input: Option<String>,
    pub id: Option<String>,
}

/// Query a document's indexed content.
pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Json<ApiResponse> {
    let input = body.input.unwrap_or_default();
    let id = body.id.unwrap_or_default();
    if input.trim().is_empty() || id.trim().is_empty() {
        return ApiResponse::fail("input or id is missing");
    }

    match state.retrieval.search(&input, &id).await {
        Ok(texts) => ApiResponse::ok(json!(texts)),
        Err(RetrievalError::Engine { reason, .. }) => {
            error!("chatSearch failed: {}", reason);
            ApiResponse::fail(reason)
        }
        Err(err) => {
            error!("fileSearch service: {}", err);
            ApiResponse::fail("fileSearch failed")
        }
    }
}

/// Document info for initializing a chat session; the id must be
/// exactly the content-hash length.
pub async fn document_info(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Json<ApiResponse> {
    let doc_id = doc_id.trim().to_string();
    if !hashing::is_content_hash(&doc_id) {
        return ApiResponse::fail("id is missing or incorrect");
    }

    let metadata = state.metadata.clone();
    let lookup = tokio::task::spawn_blocking(move || {
        metadata.find_unique(EntityKind::Document, &doc_id)
    })
    .await;

    match lookup {
        Ok(Ok(Some(record))) => {
            ApiResponse::ok(serde_json::to_value(&record).unwrap_or(Value::Null))
        }
        Ok(Ok(None)) => ApiResponse::fail("document not found"),
        Ok(Err(err)) => {
            error!("initChat: {}", err);
            ApiResponse::fail("chat start failed")
        }
        Err(err) => {
            error!("initChat join error: {}", err);
            ApiResponse::fail("chat start failed")
        }
    }
}

async fn list_entities(
    state: AppState,
    kind: EntityKind,
    paging: Paging,
) -> Json<ApiResponse> {
    let metadata = state.metadata.clone();
    let result = tokio::task::spawn_blocking(move || metadata.find_many(kind, paging)).await;

    match result {
        Ok(Ok(Some(page))) => {
            ApiResponse::ok(serde_json::to_value(&page).unwrap_or(Value::Null))
        }
        Ok(Ok(None)) => ApiResponse::ok_with_message(json!([]), "no data found"),
        Ok(Err(err)) => {
            error!("error listing {}: {}", kind, err);
            ApiResponse::fail("list failed")
        }
        Err(err) => {
            error!("list join error: {}", err);
            ApiResponse::fail("list failed")
        }
    }
}

/// Paginated document listing.
pub async fn file_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<ApiResponse> {
    list_entities(state, EntityKind::Document, params.paging()).await
}

/// Paginated category listing.
pub async fn category_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<ApiResponse> {
    list_entities(state, EntityKind::Category, params.paging()).await
}

/// Paginated tag listing.
pub async fn tag_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<ApiResponse> {
    list_entities(state, EntityKind::Tag, params.paging()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_mixed_shapes() {
        let tags = parse_tags(r#"[{"id": 3}, {"id": 7, "name": "x"}, 11]"#);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].id, Some(3));
        assert_eq!(tags[0].name, "");
        assert_eq!(tags[1].id, Some(7));
        assert_eq!(tags[1].name, "x");
        assert_eq!(tags[2].id, Some(11));
    }

    #[test]
    fn test_parse_tags_new_tag_without_id() {
        let tags = parse_tags(r#"[{"name": "fresh", "alias": "f"}]"#);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, None);
        assert_eq!(tags[0].name, "fresh");
        assert_eq!(tags[0].alias.as_deref(), Some("f"));
    }

    #[test]
    fn test_parse_tags_garbage_is_empty() {
        assert!(parse_tags("not json").is_empty());
        assert!(parse_tags(r#"{"id": 1}"#).is_empty());
        assert!(parse_tags(r#"["strings", true]"#).is_empty());
    }

    #[test]
    fn test_list_params_defaults() {
        let params = ListParams {
            size: None,
            page: None,
        };
        let paging = params.paging();
        assert_eq!(paging.page_size, 10);
        assert_eq!(paging.page_num, 0);
    }
}
