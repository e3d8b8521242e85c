//! Configuration management for ragdex.
//!
//! Settings come from an optional TOML config file overlaid with
//! `RAGDEX_*` environment variables. The development-mode flag that
//! bypasses upload deduplication lives here and nowhere else: it is
//! explicit configuration, never sniffed from the environment at the
//! call site.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default relevance threshold for retrieval filtering.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.35;

/// Default number of candidates requested from the vector index.
pub const DEFAULT_SEARCH_TOP_K: usize = 5;

/// Runtime settings for the ingestion and retrieval pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Directory for uploaded blobs (content-addressed storage root).
    pub upload_dir: PathBuf,
    /// Path to the local key-value index database.
    pub key_index_path: PathBuf,
    /// Path to the relational metadata database.
    pub database_path: PathBuf,
    /// Embedding backend endpoint (Ollama-compatible).
    pub embedding_endpoint: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Vector index endpoint (Qdrant-compatible REST).
    pub vector_endpoint: String,
    /// Vector index collection name.
    pub vector_collection: String,
    /// Minimum similarity score a chunk must exceed to be returned.
    pub relevance_threshold: f32,
    /// Number of candidates requested per similarity search.
    pub search_top_k: usize,
    /// Development mode: bypass the upload dedup short-circuit.
    pub dev_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from(".ragdex");
        Self {
            upload_dir: data_dir.join("uploads"),
            key_index_path: data_dir.join("key_index.db"),
            database_path: data_dir.join("ragdex.db"),
            data_dir,
            embedding_endpoint: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            vector_endpoint: "http://localhost:6333".to_string(),
            vector_collection: "ragdex_chunks".to_string(),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            search_top_k: DEFAULT_SEARCH_TOP_K,
            dev_mode: false,
        }
    }
}

/// File-level configuration, all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub data_dir: Option<String>,
    pub upload_dir: Option<String>,
    pub key_index_path: Option<String>,
    pub database_path: Option<String>,
    pub embedding_endpoint: Option<String>,
    pub embedding_model: Option<String>,
    pub vector_endpoint: Option<String>,
    pub vector_collection: Option<String>,
    pub relevance_threshold: Option<f32>,
    pub search_top_k: Option<usize>,
    pub dev_mode: Option<bool>,
}

impl ConfigFile {
    /// Parse a TOML config file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Resolve a path string: tilde-expanded, relative paths joined onto `base_dir`.
    fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically the config file dir).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = Self::resolve_path(data_dir, base_dir);
            settings.upload_dir = settings.data_dir.join("uploads");
            settings.key_index_path = settings.data_dir.join("key_index.db");
            settings.database_path = settings.data_dir.join("ragdex.db");
        }
        if let Some(ref dir) = self.upload_dir {
            settings.upload_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref path) = self.key_index_path {
            settings.key_index_path = Self::resolve_path(path, base_dir);
        }
        if let Some(ref path) = self.database_path {
            settings.database_path = Self::resolve_path(path, base_dir);
        }
        if let Some(ref endpoint) = self.embedding_endpoint {
            settings.embedding_endpoint = endpoint.clone();
        }
        if let Some(ref model) = self.embedding_model {
            settings.embedding_model = model.clone();
        }
        if let Some(ref endpoint) = self.vector_endpoint {
            settings.vector_endpoint = endpoint.clone();
        }
        if let Some(ref collection) = self.vector_collection {
            settings.vector_collection = collection.clone();
        }
        if let Some(threshold) = self.relevance_threshold {
            settings.relevance_threshold = threshold;
        }
        if let Some(top_k) = self.search_top_k {
            settings.search_top_k = top_k;
        }
        if let Some(dev) = self.dev_mode {
            settings.dev_mode = dev;
        }
    }
}

/// Load settings: defaults, then optional config file, then env overrides.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(path) = config_path {
        let config = ConfigFile::from_path(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.apply_to_settings(&mut settings, base_dir);
    }

    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn apply_env_overrides(settings: &mut Settings) {
    let cwd = PathBuf::from(".");
    if let Some(dir) = env_var("RAGDEX_UPLOAD_DIR") {
        settings.upload_dir = ConfigFile::resolve_path(&dir, &cwd);
    }
    if let Some(path) = env_var("RAGDEX_KEY_INDEX_PATH") {
        settings.key_index_path = ConfigFile::resolve_path(&path, &cwd);
    }
    if let Some(path) = env_var("RAGDEX_DATABASE_PATH") {
        settings.database_path = ConfigFile::resolve_path(&path, &cwd);
    }
    if let Some(endpoint) = env_var("RAGDEX_EMBEDDING_ENDPOINT") {
        settings.embedding_endpoint = endpoint;
    }
    if let Some(model) = env_var("RAGDEX_EMBEDDING_MODEL") {
        settings.embedding_model = model;
    }
    if let Some(endpoint) = env_var("RAGDEX_VECTOR_ENDPOINT") {
        settings.vector_endpoint = endpoint;
    }
    if let Some(collection) = env_var("RAGDEX_VECTOR_COLLECTION") {
        settings.vector_collection = collection;
    }
    if let Some(threshold) = env_var("RAGDEX_RELEVANCE_THRESHOLD") {
        match threshold.parse::<f32>() {
            Ok(value) => settings.relevance_threshold = value,
            Err(_) => tracing::warn!(
                "ignoring unparseable RAGDEX_RELEVANCE_THRESHOLD: {}",
                threshold
            ),
        }
    }
    if let Some(top_k) = env_var("RAGDEX_SEARCH_TOP_K") {
        match top_k.parse::<usize>() {
            Ok(value) => settings.search_top_k = value,
            Err(_) => tracing::warn!("ignoring unparseable RAGDEX_SEARCH_TOP_K: {}", top_k),
        }
    }
    if let Some(dev) = env_var("RAGDEX_DEV_MODE") {
        settings.dev_mode = matches!(dev.as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.relevance_threshold, DEFAULT_RELEVANCE_THRESHOLD);
        assert_eq!(settings.search_top_k, DEFAULT_SEARCH_TOP_K);
        assert!(!settings.dev_mode);
        assert!(settings.upload_dir.ends_with("uploads"));
    }

    #[test]
    fn test_config_file_applies_paths() {
        let config = ConfigFile {
            data_dir: Some("/srv/ragdex".to_string()),
            dev_mode: Some(true),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc"));
        assert_eq!(settings.upload_dir, PathBuf::from("/srv/ragdex/uploads"));
        assert_eq!(
            settings.database_path,
            PathBuf::from("/srv/ragdex/ragdex.db")
        );
        assert!(settings.dev_mode);
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let config = ConfigFile {
            upload_dir: Some("files".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/opt/app"));
        assert_eq!(settings.upload_dir, PathBuf::from("/opt/app/files"));
    }

    #[test]
    fn test_parse_toml() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            embedding_model = "all-minilm"
            relevance_threshold = 0.5
            search_top_k = 8
            "#,
        )
        .unwrap();
        assert_eq!(parsed.embedding_model.as_deref(), Some("all-minilm"));
        assert_eq!(parsed.relevance_threshold, Some(0.5));
        assert_eq!(parsed.search_top_k, Some(8));
    }
}
