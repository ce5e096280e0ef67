//! Resolved run configuration.
//!
//! A [`RunConfig`] is built once at startup from CLI flags, the optional
//! config file and the environment, then passed by reference to every
//! component. A copy is stored in `run.json` so a resumed run can detect
//! incompatible changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 1;

/// Default de-identifier invocation. `{source}` and `{destination}` are
/// substituted per item.
pub const DEFAULT_DEID_COMMAND: [&str; 3] = ["svs-deidentify", "{source}", "{destination}"];

/// Object-storage destination for uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Target {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl S3Target {
    /// Object key for a file name: `prefix/name` with surrounding slashes
    /// stripped from the prefix, or just `name` without a prefix.
    #[must_use]
    pub fn key_for(&self, file_name: &str) -> String {
        let prefix = self
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .unwrap_or("");
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    /// Whether two targets address the same bucket and key space.
    #[must_use]
    pub fn same_destination(&self, other: &S3Target) -> bool {
        self.bucket == other.bucket && self.key_for("") == other.key_for("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub manifest: PathBuf,
    pub out_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Target>,
    /// Keep the de-identified artifact after a confirmed upload.
    pub keep_local: bool,
    pub dry_run: bool,
    pub resume: bool,
    /// On resume, give failed items another attempt.
    pub retry_failed: bool,
    pub workers: usize,
    /// Report success even when some items failed.
    pub allow_partial: bool,
    /// Stop scheduling new items after the first failure.
    pub fail_fast: bool,
    /// Upper bound on items scheduled in this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Per-call timeout for the de-identifier and uploader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub deid_command: Vec<String>,
}

impl RunConfig {
    /// Configuration with defaults for everything but the two required paths.
    pub fn new(manifest: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            out_dir: out_dir.into(),
            s3: None,
            keep_local: true,
            dry_run: false,
            resume: false,
            retry_failed: false,
            workers: DEFAULT_WORKERS,
            allow_partial: false,
            fail_fast: false,
            max_files: None,
            timeout_secs: None,
            deid_command: DEFAULT_DEID_COMMAND.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn upload_enabled(&self) -> bool {
        self.s3.is_some()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn with_s3(mut self, target: S3Target) -> Self {
        self.s3 = Some(target);
        self
    }

    #[must_use]
    pub fn with_keep_local(mut self, keep_local: bool) -> Self {
        self.keep_local = keep_local;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }
}
