//! Artifact digests.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FsError, Result};

/// Compute the SHA-256 of a file as lowercase hex.
///
/// Slides run to several gigabytes, so the file is streamed in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| FsError::io("open", path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1 << 20];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| FsError::io("read", path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Returns `Ok(true)` when the file's digest matches `expected`.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    let actual = sha256_file(path)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}
