use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{FsError, Result};

/// Extension appended to a destination while it is being produced.
pub const PARTIAL_EXTENSION: &str = "partial";

/// Write `bytes` to `path` atomically.
///
/// The data goes to a sibling temp file which is synced and then renamed
/// over the target, so a crash leaves either the old or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FsError::io("create directory", parent, e))?;
    }

    let temp_path = sibling_with_suffix(path, "tmp");
    let mut file = File::create(&temp_path).map_err(|e| FsError::io("create", &temp_path, e))?;
    file.write_all(bytes)
        .map_err(|e| FsError::io("write", &temp_path, e))?;
    file.sync_all()
        .map_err(|e| FsError::io("sync", &temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| FsError::AtomicWriteFailed {
        temp_path: temp_path.clone(),
        target_path: path.to_path_buf(),
        source: e,
    })?;

    tracing::trace!(path = %path.display(), bytes = bytes.len(), "atomic write");
    Ok(())
}

/// Path the de-identifier writes to before the artifact is verified.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    sibling_with_suffix(destination, PARTIAL_EXTENSION)
}

/// Remove a file, treating "already gone" as success. Returns whether a
/// file was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FsError::io("remove", path, e)),
    }
}

/// Length of a regular, non-empty file, or `None` when the path is missing,
/// empty or not a file.
#[must_use]
pub fn non_empty_file_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status").join("status.csv");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!path.with_file_name("status.csv.tmp").exists());
    }

    #[test]
    fn partial_path_keeps_full_name() {
        let path = partial_path(Path::new("/out/svs/svs_abc.svs"));
        assert_eq!(path, PathBuf::from("/out/svs/svs_abc.svs.partial"));
    }

    #[test]
    fn remove_if_exists_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.svs");
        fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn empty_files_have_no_length() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.svs");
        let full = dir.path().join("full.svs");
        fs::write(&empty, b"").unwrap();
        fs::write(&full, b"abc").unwrap();
        assert_eq!(non_empty_file_len(&empty), None);
        assert_eq!(non_empty_file_len(&full), Some(3));
        assert_eq!(non_empty_file_len(&dir.path().join("missing")), None);
        assert_eq!(non_empty_file_len(dir.path()), None);
    }
}
