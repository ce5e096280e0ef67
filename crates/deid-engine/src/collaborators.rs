//! Seams to the external de-identifier and object store.

use std::path::Path;
use std::time::Duration;

use deid_model::RemoteObject;

use crate::error::{DeidentifyError, UploadError};

/// Strips identifying regions from a slide.
///
/// Implementations write the de-identified copy to `destination` and must
/// never modify `source`. The engine passes a `.partial` path as
/// `destination` and only trusts it after verification.
///
/// With a `limit`, the call must stop all of its work, including any child
/// process, and return [`DeidentifyError::TimedOut`] once the limit passes.
/// Nothing may write to `destination` after the call returns.
pub trait Deidentifier: Send + Sync {
    fn deidentify(
        &self,
        source: &Path,
        destination: &Path,
        limit: Option<Duration>,
    ) -> Result<(), DeidentifyError>;
}

/// Stores artifacts in object storage.
///
/// `put` must be idempotent: uploading the same file to the same key twice
/// leaves one object.
pub trait Uploader: Send + Sync {
    fn put(&self, local: &Path, bucket: &str, key: &str) -> Result<RemoteObject, UploadError>;

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, UploadError>;
}
