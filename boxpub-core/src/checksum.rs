//! Content digests for box files
//!
//! Boxes are routinely several gigabytes, so files are streamed through the
//! hasher in fixed-size chunks instead of being read into memory.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Checksum type recorded in the manifest for every provider entry
pub const CHECKSUM_TYPE: &str = "sha256";

/// Read buffer size for streaming digests
const CHUNK_SIZE: usize = 64 * 1024;

/// Failed to read a file while computing its digest
#[derive(Error, Debug)]
#[error("Failed to read {} for checksum", .path.display())]
pub struct ChecksumError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Hash a file's contents using SHA-256, returning lowercase hex
///
/// Any read error aborts the digest; a partial digest is never returned.
pub async fn sha256_file(path: &Path) -> Result<String, ChecksumError> {
    let wrap = |source: std::io::Error| ChecksumError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(wrap)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(wrap)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash in-memory content using SHA-256, returning lowercase hex
pub fn sha256_bytes(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Check that a string looks like a lowercase hex SHA-256 digest
pub fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64
        && digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
