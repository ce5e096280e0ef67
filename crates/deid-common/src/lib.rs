//! Filesystem helpers shared across the pipeline.
//!
//! - `atomic_write`: temp file + fsync + rename, so readers never observe a
//!   half-written report or checkpoint
//! - `sha256_file`: streaming SHA-256 digest used as artifact evidence
//! - `partial_path`: where the de-identifier writes before verification

mod error;
mod fs;
mod hash;

pub use error::{FsError, Result};
pub use fs::{PARTIAL_EXTENSION, atomic_write, non_empty_file_len, partial_path, remove_if_exists};
pub use hash::{sha256_file, verify_sha256};
