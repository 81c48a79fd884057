//! Content fingerprinting.
//!
//! A fingerprint is the SHA-256 of a piece of content, hex-encoded. It
//! serves as both the cache key and the change detector: any byte change
//! in the content changes the fingerprint.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex fingerprint of `content`.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Abbreviate a fingerprint for log output.
pub fn short(fp: &str) -> &str {
    &fp[..fp.len().min(16)]
}
