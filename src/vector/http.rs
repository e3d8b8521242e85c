//! Qdrant-compatible REST vector index client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{ScoredText, SearchOutcome, SearchStatus, VectorError, VectorIndex};
use crate::models::EmbeddedChunk;

/// Vector index over a Qdrant-style REST API.
///
/// The collection is created on first upsert, sized from the first
/// chunk's embedding (cosine distance).
pub struct HttpVectorIndex {
    endpoint: String,
    collection: String,
    client: Client,
    collection_ready: OnceCell<()>,
}

#[derive(Debug, Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

/// Error body shape: `{"status": {"error": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    status: serde_json::Value,
}

impl HttpVectorIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, VectorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VectorError::Connection(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client,
            collection_ready: OnceCell::new(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.endpoint, self.collection, suffix
        )
    }

    /// Pull the engine's error reason out of a response body, if present.
    fn error_reason(body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            if let Some(reason) = parsed.status.get("error").and_then(|e| e.as_str()) {
                return reason.to_string();
            }
        }
        body.chars().take(200).collect()
    }

    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, vector_size: usize) -> Result<(), VectorError> {
        self.collection_ready
            .get_or_try_init(|| async {
                let info = self
                    .client
                    .get(self.collection_url(""))
                    .send()
                    .await
                    .map_err(|e| VectorError::Connection(e.to_string()))?;
                if info.status().is_success() {
                    return Ok(());
                }

                let body = json!({
                    "vectors": { "size": vector_size, "distance": "Cosine" }
                });
                let resp = self
                    .client
                    .put(self.collection_url(""))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| VectorError::Connection(e.to_string()))?;
                if resp.status().is_success() {
                    info!("created vector collection '{}'", self.collection);
                    Ok(())
                } else {
                    let reason = Self::error_reason(&resp.text().await.unwrap_or_default());
                    Err(VectorError::Api(reason))
                }
            })
            .await
            .map(|_| ())
    }

    fn document_filter(document_id: &str) -> serde_json::Value {
        json!({
            "must": [
                { "key": "document_id", "match": { "value": document_id } }
            ]
        })
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), VectorError> {
        let Some(first) = chunks.first() else {
            warn!("no chunks to upsert for document {}", document_id);
            return Ok(());
        };
        self.ensure_collection(first.embedding.len()).await?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|chunk| PointStruct {
                id: uuid::Uuid::new_v4().to_string(),
                vector: chunk.embedding.clone(),
                payload: json!({
                    "document_id": document_id,
                    "text": chunk.chunk.text,
                    "file_name": chunk.chunk.metadata.file_name,
                    "file_type": chunk.chunk.metadata.file_type,
                }),
            })
            .collect();

        debug!(
            "upserting {} points for document {}",
            points.len(),
            document_id
        );
        let resp = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| VectorError::Connection(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let reason = Self::error_reason(&resp.text().await.unwrap_or_default());
            Err(VectorError::Api(reason))
        }
    }

    async fn search(
        &self,
        document_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<SearchOutcome, VectorError> {
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
            "filter": Self::document_filter(document_id),
        });

        let resp = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorError::Connection(e.to_string()))?;

        let http_status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| VectorError::Parse(e.to_string()))?;

        // The engine answered; a non-2xx here is an engine-level failure
        // (bad collection, dimension mismatch), reported through the
        // outcome status rather than as a transport error.
        if !http_status.is_success() {
            let reason = Self::error_reason(&raw);
            return Ok(SearchOutcome {
                status: SearchStatus::failed(http_status.as_u16() as i32, reason),
                results: Vec::new(),
            });
        }

        let parsed: SearchResponse =
            serde_json::from_str(&raw).map_err(|e| VectorError::Parse(e.to_string()))?;

        let results = parsed
            .result
            .into_iter()
            .map(|point| ScoredText {
                text: point
                    .payload
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                score: point.score,
            })
            .collect();

        Ok(SearchOutcome::ok(results))
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorError> {
        let body = json!({ "filter": Self::document_filter(document_id) });
        let resp = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorError::Connection(e.to_string()))?;

        // 404 means the collection was never created; nothing to delete.
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let reason = Self::error_reason(&resp.text().await.unwrap_or_default());
            Err(VectorError::Api(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reason_extracts_engine_error() {
        let body = r#"{"status": {"error": "dimension mismatch"}, "time": 0.1}"#;
        assert_eq!(HttpVectorIndex::error_reason(body), "dimension mismatch");
    }

    #[test]
    fn test_error_reason_falls_back_to_body() {
        assert_eq!(HttpVectorIndex::error_reason("plain failure"), "plain failure");
    }

    #[test]
    fn test_document_filter_shape() {
        let filter = HttpVectorIndex::document_filter("abc");
        assert_eq!(
            filter["must"][0]["match"]["value"],
            serde_json::json!("abc")
        );
    }
}
