//! Externally visible status rows.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::work_item::WorkItem;

/// Column order of `status.csv`.
///
/// Source paths often carry identifiers in their file names, so only their
/// digest is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub id: String,
    pub index: usize,
    pub source_hash: String,
    pub destination: String,
    pub stage: String,
    pub failed_stage: String,
    pub error_kind: String,
    pub error: String,
    pub sha256: String,
    pub size_bytes: String,
    pub s3_uri: String,
    pub local_deleted: String,
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&WorkItem> for StatusRecord {
    fn from(item: &WorkItem) -> Self {
        let failure = item.failure.as_ref();
        Self {
            id: item.id.clone(),
            index: item.index,
            source_hash: source_hash(&item.source),
            destination: item.destination.display().to_string(),
            stage: item.stage.to_string(),
            failed_stage: failure.map(|f| f.stage.to_string()).unwrap_or_default(),
            error_kind: failure.map(|f| f.kind.to_string()).unwrap_or_default(),
            error: failure.map(|f| f.message.clone()).unwrap_or_default(),
            sha256: item.sha256.clone().unwrap_or_default(),
            size_bytes: item.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
            s3_uri: item
                .remote
                .as_ref()
                .map(|r| r.uri.clone())
                .unwrap_or_default(),
            local_deleted: if item.local_deleted { "yes" } else { "no" }.to_string(),
            attempts: item.attempts,
            created_at: format_timestamp(item.created_at),
            updated_at: format_timestamp(item.updated_at),
        }
    }
}

/// Hex SHA-256 of a resolved source path.
#[must_use]
pub fn source_hash(source: &Path) -> String {
    hex::encode(Sha256::digest(source.to_string_lossy().as_bytes()))
}

/// RFC 3339 UTC with second precision, as used in every report.
#[must_use]
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
