//! Content-addressed blob storage for uploaded documents.
//!
//! Uploads are spooled into a temp file in the storage root while being
//! hashed, then committed with a rename to `{root}/{hash}.{ext}`. A
//! reader therefore never observes a partial file at the final path.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::hashing::ContentHasher;

/// Errors from blob storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload stream failed: {0}")]
    UploadStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An upload spooled to disk: hashed, sized, not yet at its final path.
pub struct SpooledBlob {
    file: NamedTempFile,
    hash: String,
    size: u64,
}

impl SpooledBlob {
    /// Content hash of the spooled bytes.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Size of the spooled bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Filesystem-backed content-addressed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final storage path for a given content hash and extension.
    pub fn blob_path(&self, hash: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", hash, extension))
    }

    fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Look up an already-stored blob by content hash, whatever its extension.
    pub fn find_existing(&self, hash: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem == hash)
            {
                return Some(path);
            }
        }
        None
    }

    /// Whether a blob for this content hash is already durably stored.
    pub fn exists(&self, hash: &str) -> bool {
        self.find_existing(hash).is_some()
    }

    /// Stream bytes into a temp file in the storage root, hashing as they
    /// arrive. The result is not visible at any final blob path until
    /// [`commit`](Self::commit).
    pub async fn spool<S, E>(&self, mut stream: S) -> Result<SpooledBlob, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        self.ensure_root()?;
        let mut file = NamedTempFile::new_in(&self.root)?;
        let mut hasher = ContentHasher::new();

        while let Some(frame) = stream.next().await {
            let frame = frame.map_err(|err| StorageError::UploadStream(err.to_string()))?;
            hasher.update(&frame);
            file.write_all(&frame)?;
        }
        file.flush()?;

        let size = hasher.bytes_hashed();
        let hash = hasher.finish();
        Ok(SpooledBlob { file, hash, size })
    }

    /// Atomically move a spooled blob to its final content-addressed path.
    ///
    /// A concurrent commit of identical content targets the same path with
    /// the same bytes, so the rename is idempotent in content.
    pub fn commit(&self, spooled: SpooledBlob, extension: &str) -> Result<PathBuf, StorageError> {
        let target = self.blob_path(&spooled.hash, extension);
        spooled
            .file
            .persist(&target)
            .map_err(|err| StorageError::Io(err.error))?;
        info!("blob stored: {}", target.display());
        Ok(target)
    }

    /// Drop a spooled blob without committing it; the temp file is removed.
    pub fn discard(&self, spooled: SpooledBlob) {
        // NamedTempFile removes itself on drop; make the intent explicit.
        drop(spooled.file);
    }

    /// Best-effort blob removal. A dangling blob is a cleanup issue, not a
    /// correctness issue for the index, so failure is logged and swallowed.
    pub fn delete(&self, path: &Path) -> bool {
        if !path.exists() {
            warn!(
                "blob delete skipped, wrong path or blob not found: {}",
                path.display()
            );
            return false;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("blob deleted: {}", path.display());
                true
            }
            Err(err) => {
                warn!("blob delete failed for {}: {}", path.display(), err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::tempdir;

    fn frames(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_spool_hashes_and_sizes() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let spooled = store.spool(frames(&[b"hello ", b"world"])).await.unwrap();
        assert_eq!(spooled.size(), 11);
        assert_eq!(spooled.hash(), crate::hashing::hash_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn test_commit_places_blob_at_hash_path() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let spooled = store.spool(frames(&[b"content"])).await.unwrap();
        let hash = spooled.hash().to_string();
        assert!(!store.exists(&hash));

        let path = store.commit(spooled, "txt").unwrap();
        assert_eq!(path, store.blob_path(&hash, "txt"));
        assert!(store.exists(&hash));
        assert_eq!(std::fs::read(&path).unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_discard_removes_temp_file() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let spooled = store.spool(frames(&[b"abandoned"])).await.unwrap();
        store.discard(spooled);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_find_existing_ignores_extension() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let spooled = store.spool(frames(&[b"pdf bytes"])).await.unwrap();
        let hash = spooled.hash().to_string();
        store.commit(spooled, "pdf").unwrap();

        let found = store.find_existing(&hash).unwrap();
        assert_eq!(found.extension().unwrap(), "pdf");
    }

    #[test]
    fn test_delete_missing_blob_is_not_an_error() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        assert!(!store.delete(&dir.path().join("nope.txt")));
    }

    #[tokio::test]
    async fn test_delete_existing_blob() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let spooled = store.spool(frames(&[b"bye"])).await.unwrap();
        let path = store.commit(spooled, "txt").unwrap();
        assert!(store.delete(&path));
        assert!(!path.exists());
    }
}
