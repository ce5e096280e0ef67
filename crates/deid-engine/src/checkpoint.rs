//! Durable run checkpoint (`out/run.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use deid_common::atomic_write;
use deid_model::{CURRENT_SCHEMA_VERSION, RunJournal, RunState};

use crate::error::CheckpointError;

/// File name of the checkpoint inside the output directory.
pub const CHECKPOINT_FILE: &str = "run.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint at `out_dir/run.json`.
    pub fn in_dir(out_dir: &Path) -> Self {
        Self::new(out_dir.join(CHECKPOINT_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the journal for `state` atomically.
    pub fn save(&self, state: &RunState) -> Result<(), CheckpointError> {
        let bytes = RunJournal::from_state(state)
            .to_json_bytes()
            .map_err(CheckpointError::Serialize)?;
        atomic_write(&self.path, &bytes)?;
        tracing::trace!(
            path = %self.path.display(),
            items = state.items.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Read the journal back.
    ///
    /// The schema version is checked before the full document is decoded,
    /// so a checkpoint from a newer tool fails with
    /// [`CheckpointError::UnsupportedVersion`] rather than a parse error.
    pub fn load(&self) -> Result<RunJournal, CheckpointError> {
        let bytes = fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                CheckpointError::Missing {
                    path: self.path.clone(),
                }
            } else {
                CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| self.parse_error(source))?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if found > u64::from(CURRENT_SCHEMA_VERSION) {
            return Err(CheckpointError::UnsupportedVersion {
                path: self.path.clone(),
                found,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        let journal: RunJournal =
            serde_json::from_value(value).map_err(|source| self.parse_error(source))?;
        tracing::debug!(
            path = %self.path.display(),
            run_id = %journal.state.run_id,
            items = journal.state.items.len(),
            "checkpoint loaded"
        );
        Ok(journal)
    }

    fn parse_error(&self, source: serde_json::Error) -> CheckpointError {
        CheckpointError::Parse {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use deid_model::RunConfig;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let checkpoint = Checkpoint::in_dir(dir.path());
        let state = RunState::new(RunConfig::new("manifest.csv", dir.path()), Vec::new());

        checkpoint.save(&state).unwrap();
        let journal = checkpoint.load().unwrap();

        assert_eq!(journal.state, state);
        assert_eq!(checkpoint.path().file_name().unwrap(), CHECKPOINT_FILE);
    }

    #[test]
    fn missing_checkpoint() {
        let dir = tempdir().unwrap();
        let err = Checkpoint::in_dir(dir.path()).load().unwrap_err();
        assert!(matches!(err, CheckpointError::Missing { .. }));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempdir().unwrap();
        let checkpoint = Checkpoint::in_dir(dir.path());
        fs::write(checkpoint.path(), r#"{"schema_version": 99, "state": {}}"#).unwrap();

        let err = checkpoint.load().unwrap_err();

        assert!(matches!(
            err,
            CheckpointError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let checkpoint = Checkpoint::in_dir(dir.path());
        fs::write(checkpoint.path(), "{not json").unwrap();

        assert!(matches!(
            checkpoint.load().unwrap_err(),
            CheckpointError::Parse { .. }
        ));
    }
}
