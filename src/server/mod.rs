//! Web server exposing the ingestion and retrieval pipeline.
//!
//! Every public operation answers with the uniform envelope
//! `{code, data, message}`: code 0 is success (including the "already
//! uploaded" and "no relevant content" sub-cases), any non-zero code is
//! a failure with a display-ready message.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::embedding::{ChunkingEmbedder, Embedder, OllamaEmbedder};
use crate::key_index::KeyIndex;
use crate::repository::MetadataStore;
use crate::services::{IngestionService, RetrievalService};
use crate::storage::BlobStore;
use crate::vector::{HttpVectorIndex, VectorIndex};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestionService>,
    pub retrieval: Arc<RetrievalService>,
    pub metadata: MetadataStore,
}

impl AppState {
    /// Build the pipeline against the configured external backends.
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
            settings.embedding_endpoint.clone(),
            settings.embedding_model.clone(),
        )?);
        let vectors: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndex::new(
            settings.vector_endpoint.clone(),
            settings.vector_collection.clone(),
        )?);
        Self::with_backends(settings, embedder, vectors)
    }

    /// Build the pipeline around explicit embedding/vector backends.
    pub fn with_backends(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
    ) -> anyhow::Result<Self> {
        let blobs = BlobStore::new(&settings.upload_dir);
        let key_index = KeyIndex::new(&settings.key_index_path);
        let metadata = MetadataStore::new(&settings.database_path)?;
        let pipeline = ChunkingEmbedder::new(embedder.clone());

        let ingest = Arc::new(IngestionService::new(
            blobs,
            key_index,
            metadata.clone(),
            pipeline,
            vectors.clone(),
            settings.dev_mode,
        ));
        let retrieval = Arc::new(RetrievalService::new(
            embedder,
            vectors,
            settings.relevance_threshold,
            settings.search_top_k,
        ));

        Ok(Self {
            ingest,
            retrieval,
            metadata,
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::embedding::EmbedError;
    use crate::vector::MemoryVectorIndex;

    struct StaticEmbedder;

    #[async_trait::async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.data_dir = dir.path().to_path_buf();
        settings.upload_dir = dir.path().join("uploads");
        settings.key_index_path = dir.path().join("kv.db");
        settings.database_path = dir.path().join("meta.db");

        let state = AppState::with_backends(
            &settings,
            Arc::new(StaticEmbedder),
            Arc::new(MemoryVectorIndex::new()),
        )
        .unwrap();
        (create_router(state), dir)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_categories_list_returns_envelope() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/categories")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], 0);
        // The default category is seeded at schema init.
        assert_eq!(parsed["data"]["total"], 1);
    }

    #[tokio::test]
    async fn test_search_requires_input_and_id() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/search")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"input": "", "id": ""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], -1);
    }

    #[tokio::test]
    async fn test_document_info_validates_id_shape() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/documents/not-a-hash")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], -1);
        assert_eq!(parsed["message"], "id is missing or incorrect");
    }
}
