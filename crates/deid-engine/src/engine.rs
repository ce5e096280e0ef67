//! Per-item stage execution.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use deid_common::{non_empty_file_len, partial_path, remove_if_exists, sha256_file};
use deid_model::{FailureKind, RunConfig, S3Target, Stage, WorkItem};

use crate::collaborators::{Deidentifier, Uploader};
use crate::error::{CallError, DeidentifyError, EngineError};
use crate::timeout::call_with_timeout;
use crate::writer::WriterHandle;

/// What an item currently has to show for its work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Local(PathBuf),
    Remote(String),
}

/// Result of one [`RunEngine::advance`] or [`RunEngine::drive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub id: String,
    pub index: usize,
    pub stage: Stage,
    pub artifact: Option<Artifact>,
}

impl StageResult {
    fn of(item: &WorkItem) -> Self {
        let artifact = match (&item.remote, item.stage) {
            (Some(remote), Stage::Uploaded | Stage::Done) => {
                Some(Artifact::Remote(remote.uri.clone()))
            }
            (_, Stage::Deidentified | Stage::Uploaded | Stage::Done) if !item.local_deleted => {
                Some(Artifact::Local(item.destination.clone()))
            }
            _ => None,
        };
        Self {
            id: item.id.clone(),
            index: item.index,
            stage: item.stage,
            artifact,
        }
    }
}

/// Drives work items through the stage machine, persisting every
/// transition through the state writer before reporting it.
pub struct RunEngine {
    deidentifier: Arc<dyn Deidentifier>,
    uploader: Option<(Arc<dyn Uploader>, S3Target)>,
    writer: WriterHandle,
    keep_local: bool,
    fail_fast: bool,
    timeout: Option<Duration>,
}

impl RunEngine {
    pub fn new(
        config: &RunConfig,
        deidentifier: Arc<dyn Deidentifier>,
        uploader: Option<Arc<dyn Uploader>>,
        writer: WriterHandle,
    ) -> Result<Self, EngineError> {
        let uploader = match (&config.s3, uploader) {
            (Some(target), Some(uploader)) => Some((uploader, target.clone())),
            (Some(_), None) => return Err(EngineError::UploaderRequired),
            (None, _) => None,
        };
        Ok(Self {
            deidentifier,
            uploader,
            writer,
            keep_local: config.keep_local,
            fail_fast: config.fail_fast,
            timeout: config.timeout(),
        })
    }

    /// Run the single operation the item's stage calls for.
    ///
    /// The stage only moves on confirmed success, and the new snapshot is
    /// durable before this returns. Operation failures mark the item
    /// failed and return normally unless `fail_fast` is set.
    pub fn advance(&self, item: &mut WorkItem) -> Result<StageResult, EngineError> {
        match item.stage {
            Stage::Pending => self.deidentify(item),
            Stage::Deidentified => self.upload(item),
            Stage::Uploaded => self.finalize(item),
            Stage::Done | Stage::Failed => Ok(StageResult::of(item)),
        }
    }

    /// Advance until the item is done or failed.
    pub fn drive(&self, item: &mut WorkItem) -> Result<StageResult, EngineError> {
        let span = tracing::info_span!("item", id = %item.id, index = item.index);
        let _guard = span.enter();
        loop {
            let result = self.advance(item)?;
            if result.stage.is_terminal() {
                return Ok(result);
            }
        }
    }

    fn deidentify(&self, item: &mut WorkItem) -> Result<StageResult, EngineError> {
        item.attempts += 1;
        let partial = partial_path(&item.destination);
        if let Err(err) = remove_if_exists(&partial) {
            return self.record_failure(item, FailureKind::Artifact, err);
        }
        if let Some(parent) = item.destination.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            let message = format!("failed to create {}: {err}", parent.display());
            return self.record_failure(item, FailureKind::Artifact, message);
        }

        tracing::debug!(destination = %item.destination.display(), "de-identifying");
        let outcome = self
            .deidentifier
            .deidentify(&item.source, &partial, self.timeout);
        if let Err(err) = outcome {
            // Whatever the tool left behind is never trusted.
            let _ = remove_if_exists(&partial);
            let kind = match err {
                DeidentifyError::TimedOut { .. } => FailureKind::Timeout,
                _ => FailureKind::Deidentify,
            };
            return self.record_failure(item, kind, err);
        }

        let (sha256, size) = match verify_partial(&partial, &item.destination) {
            Ok(evidence) => evidence,
            Err(message) => {
                let _ = remove_if_exists(&partial);
                return self.record_failure(item, FailureKind::Artifact, message);
            }
        };
        item.sha256 = Some(sha256);
        item.size_bytes = Some(size);

        let next = if self.uploader.is_some() {
            Stage::Deidentified
        } else {
            Stage::Done
        };
        item.advance_to(next)?;
        self.commit(item)
    }

    fn upload(&self, item: &mut WorkItem) -> Result<StageResult, EngineError> {
        let Some((uploader, target)) = &self.uploader else {
            return Err(EngineError::UploaderRequired);
        };
        item.attempts += 1;
        if non_empty_file_len(&item.destination).is_none() {
            let message = format!(
                "de-identified artifact missing before upload: {}",
                item.destination.display()
            );
            return self.record_failure(item, FailureKind::Artifact, message);
        }

        let key = target.key_for(&item.file_name());
        tracing::debug!(bucket = %target.bucket, key = %key, "uploading");
        let uploader = Arc::clone(uploader);
        let local = item.destination.clone();
        let bucket = target.bucket.clone();
        let outcome = call_with_timeout(self.timeout, move || uploader.put(&local, &bucket, &key));
        match outcome {
            Ok(remote) => {
                item.remote = Some(remote);
                item.advance_to(Stage::Uploaded)?;
                self.commit(item)
            }
            Err(err) => {
                let (kind, message) = describe_call_error(FailureKind::Upload, "upload", err);
                self.record_failure(item, kind, message)
            }
        }
    }

    /// Runs only once the upload is persisted, so the local copy is never
    /// removed before the remote one is confirmed.
    fn finalize(&self, item: &mut WorkItem) -> Result<StageResult, EngineError> {
        item.attempts += 1;
        if !self.keep_local {
            if let Err(err) = remove_if_exists(&item.destination) {
                return self.record_failure(item, FailureKind::Finalize, err);
            }
            item.local_deleted = true;
        }
        item.advance_to(Stage::Done)?;
        self.commit(item)
    }

    fn commit(&self, item: &WorkItem) -> Result<StageResult, EngineError> {
        self.writer.commit(item.clone())?;
        tracing::info!(stage = %item.stage, "item advanced");
        Ok(StageResult::of(item))
    }

    fn record_failure(
        &self,
        item: &mut WorkItem,
        kind: FailureKind,
        message: impl Display,
    ) -> Result<StageResult, EngineError> {
        let message = message.to_string();
        tracing::warn!(stage = %item.stage, kind = %kind, error = %message, "item failed");
        item.fail(kind, message.clone())?;
        self.writer.commit(item.clone())?;
        if self.fail_fast {
            return Err(EngineError::FailFast {
                id: item.id.clone(),
                kind,
                message,
            });
        }
        Ok(StageResult::of(item))
    }
}

/// Check the de-identifier's output and move it onto `destination`.
/// Returns the artifact's digest and size.
fn verify_partial(partial: &Path, destination: &Path) -> Result<(String, u64), String> {
    let size = non_empty_file_len(partial)
        .ok_or_else(|| format!("de-identifier produced no output at {}", partial.display()))?;
    let sha256 = sha256_file(partial).map_err(|err| err.to_string())?;
    fs::rename(partial, destination).map_err(|err| {
        format!(
            "failed to move {} to {}: {err}",
            partial.display(),
            destination.display()
        )
    })?;
    Ok((sha256, size))
}

fn describe_call_error<E: Display>(
    kind: FailureKind,
    operation: &str,
    err: CallError<E>,
) -> (FailureKind, String) {
    match err {
        CallError::Failed(err) => (kind, err.to_string()),
        CallError::TimedOut(limit) => (
            FailureKind::Timeout,
            format!("{operation} timed out after {}s", limit.as_secs()),
        ),
        CallError::Spawn(err) => (kind, format!("failed to start {operation}: {err}")),
        CallError::Panicked => (kind, format!("{operation} panicked")),
    }
}
