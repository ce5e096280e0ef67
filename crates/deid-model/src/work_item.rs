//! Per-row unit of work.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::manifest::ManifestRow;
use crate::stage::{Failure, FailureKind, Stage};

/// Location of an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub bucket: String,
    pub key: String,
    pub uri: String,
}

impl RemoteObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let key = key.into();
        let uri = format!("s3://{bucket}/{key}");
        Self { bucket, key, uri }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable identifier, the destination file stem.
    pub id: String,
    /// Manifest position; reports are ordered by it.
    pub index: usize,
    pub row: ManifestRow,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// SHA-256 of the de-identified artifact, recorded when it was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteObject>,
    #[serde(default)]
    pub local_deleted: bool,
    /// Number of operations attempted on this item across runs.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(row: ManifestRow, source: PathBuf, destination: PathBuf) -> Self {
        let id = destination
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("item-{}", row.index));
        let now = Utc::now();
        Self {
            id,
            index: row.index,
            row,
            source,
            destination,
            stage: Stage::Pending,
            failure: None,
            sha256: None,
            size_bytes: None,
            remote: None,
            local_deleted: false,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// File name of the destination artifact.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    /// Stage the item last reached on the success path. For failed items
    /// this is the stage the failing operation started from.
    #[must_use]
    pub fn progress_stage(&self) -> Stage {
        match (&self.failure, self.stage) {
            (Some(failure), Stage::Failed) => failure.stage,
            _ => self.stage,
        }
    }

    /// Move forward along the stage machine.
    pub fn advance_to(&mut self, next: Stage) -> Result<()> {
        if next == Stage::Failed || !self.stage.can_advance_to(next) {
            return Err(ModelError::InvalidTransition {
                id: self.id.clone(),
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.touch();
        Ok(())
    }

    /// Record a failure of the operation that was about to leave the
    /// current stage.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        if !self.stage.can_advance_to(Stage::Failed) {
            return Err(ModelError::InvalidTransition {
                id: self.id.clone(),
                from: self.stage,
                to: Stage::Failed,
            });
        }
        let now = Utc::now();
        self.failure = Some(Failure {
            stage: self.stage,
            kind,
            message: message.into(),
            at: now,
        });
        self.stage = Stage::Failed;
        self.updated_at = now;
        Ok(())
    }

    /// Roll back to an earlier success-path stage whose evidence still
    /// holds. Only resume verification calls this. Evidence recorded for
    /// later stages is discarded and any failure is cleared.
    pub fn regress_to(&mut self, target: Stage) -> Result<()> {
        let current = self.progress_stage();
        let allowed = match (current.rank(), target.rank()) {
            (Some(from), Some(to)) => to <= from && target != Stage::Done,
            _ => false,
        };
        if !allowed {
            return Err(ModelError::InvalidRegression {
                id: self.id.clone(),
                from: current,
                to: target,
            });
        }
        if target == Stage::Pending {
            self.sha256 = None;
            self.size_bytes = None;
        }
        if target != Stage::Uploaded {
            self.remote = None;
        }
        self.local_deleted = false;
        self.failure = None;
        self.stage = target;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        let row = ManifestRow {
            index: 0,
            line: 2,
            location: PathBuf::from("/data/a.svs"),
            rid: "RID001".to_string(),
            specnum_formatted: "SPEC001".to_string(),
            stain: Some("H&E".to_string()),
        };
        WorkItem::new(
            row,
            PathBuf::from("/data/a.svs"),
            PathBuf::from("/out/svs/svs_0123456789abcdef.svs"),
        )
    }

    #[test]
    fn id_is_destination_stem() {
        let item = item();
        assert_eq!(item.id, "svs_0123456789abcdef");
        assert_eq!(item.file_name(), "svs_0123456789abcdef.svs");
        assert_eq!(item.stage, Stage::Pending);
    }

    #[test]
    fn advance_rejects_skips() {
        let mut item = item();
        let err = item.advance_to(Stage::Uploaded).unwrap_err();
        assert!(matches!(err, ModelError::InvalidTransition { .. }));
        assert_eq!(item.stage, Stage::Pending);
    }

    #[test]
    fn fail_remembers_origin_stage() {
        let mut item = item();
        item.advance_to(Stage::Deidentified).unwrap();
        item.fail(FailureKind::Upload, "access denied").unwrap();
        assert_eq!(item.stage, Stage::Failed);
        assert_eq!(item.progress_stage(), Stage::Deidentified);
        assert!(item.fail(FailureKind::Upload, "again").is_err());
    }

    #[test]
    fn regress_clears_later_evidence() {
        let mut item = item();
        item.advance_to(Stage::Deidentified).unwrap();
        item.sha256 = Some("abc".to_string());
        item.size_bytes = Some(10);
        item.advance_to(Stage::Uploaded).unwrap();
        item.remote = Some(RemoteObject::new("b", "k"));

        item.regress_to(Stage::Deidentified).unwrap();
        assert_eq!(item.stage, Stage::Deidentified);
        assert!(item.remote.is_none());
        assert_eq!(item.sha256.as_deref(), Some("abc"));

        item.regress_to(Stage::Pending).unwrap();
        assert!(item.sha256.is_none());
        assert!(item.size_bytes.is_none());
    }

    #[test]
    fn regress_never_moves_forward() {
        let mut item = item();
        assert!(item.regress_to(Stage::Deidentified).is_err());
        item.advance_to(Stage::Done).unwrap();
        assert!(item.regress_to(Stage::Done).is_err());
    }

    #[test]
    fn regress_resets_failed_item() {
        let mut item = item();
        item.advance_to(Stage::Deidentified).unwrap();
        item.fail(FailureKind::Timeout, "upload timed out").unwrap();
        assert!(item.regress_to(Stage::Uploaded).is_err());
        item.regress_to(Stage::Deidentified).unwrap();
        assert_eq!(item.stage, Stage::Deidentified);
        assert!(item.failure.is_none());
    }

    #[test]
    fn remote_uri_is_derived() {
        let remote = RemoteObject::new("slides", "runs/a.svs");
        assert_eq!(remote.uri, "s3://slides/runs/a.svs");
    }
}
