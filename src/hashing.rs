//! Content fingerprinting for uploaded byte streams.
//!
//! Identical bytes always produce the same fingerprint regardless of
//! filename or upload time; the fingerprint doubles as the document id
//! and dedup key.

use sha2::{Digest, Sha256};

/// Incremental SHA-256 hasher for streamed uploads.
///
/// Frames are fed as they arrive so a file never has to be buffered
/// whole to be fingerprinted.
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a frame of bytes.
    pub fn update(&mut self, frame: &[u8]) {
        self.inner.update(frame);
        self.bytes += frame.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Consume the hasher, returning the hex fingerprint.
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hash a complete in-memory buffer.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(content);
    hasher.finish()
}

/// True when `id` has the shape of a content hash (64 hex chars).
pub fn is_content_hash(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit())
}
