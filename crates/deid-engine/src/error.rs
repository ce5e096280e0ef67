//! Error types for the run-state engine.

use std::path::PathBuf;
use std::time::Duration;

use deid_common::FsError;
use deid_model::{FailureKind, ModelError};
use thiserror::Error;

/// Failure reported by a [`Deidentifier`](crate::Deidentifier).
#[derive(Debug, Error)]
pub enum DeidentifyError {
    /// The de-identifier could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The de-identifier ran and reported failure.
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The de-identifier did not finish within its limit and was stopped.
    #[error("{program} timed out after {}s", .limit.as_secs())]
    TimedOut { program: String, limit: Duration },

    /// The source slide changed while it was being read.
    #[error("source was modified during de-identification: {path}")]
    SourceModified { path: PathBuf },

    #[error("{0}")]
    Other(String),
}

/// Failure reported by an [`Uploader`](crate::Uploader).
#[derive(Debug, Error)]
pub enum UploadError {
    /// The object could not be stored, after any retries.
    #[error("upload to s3://{bucket}/{key} failed after {attempts} attempt(s): {message}")]
    Put {
        bucket: String,
        key: String,
        attempts: u32,
        message: String,
    },

    /// The object's presence could not be determined.
    #[error("failed to look up s3://{bucket}/{key}: {message}")]
    Lookup {
        bucket: String,
        key: String,
        message: String,
    },

    /// The local artifact could not be read.
    #[error("failed to read {path}: {message}")]
    Local { path: PathBuf, message: String },

    #[error("{0}")]
    Other(String),
}

/// Outcome of a collaborator call that did not return normally.
#[derive(Debug)]
pub enum CallError<E> {
    Failed(E),
    TimedOut(Duration),
    Spawn(std::io::Error),
    Panicked,
}

/// The checkpoint could not be written or read back.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Written by a newer, incompatible version of the tool.
    #[error("checkpoint {path} has schema version {found}, this build supports up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        supported: u32,
    },

    #[error("no checkpoint found at {path}")]
    Missing { path: PathBuf },
}

/// The checkpoint cannot be reconciled with the current manifest or
/// configuration.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("checkpoint items are missing from the manifest: {}", .ids.join(", "))]
    UnknownItems { ids: Vec<String> },

    #[error("S3 target changed since the checkpoint was written: {previous} -> {current}")]
    S3TargetChanged { previous: String, current: String },

    #[error("item {id} destination changed: {previous} -> {current}")]
    DestinationChanged {
        id: String,
        previous: PathBuf,
        current: PathBuf,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An item failed while `fail_fast` was set. The failure is already
    /// persisted.
    #[error("item {id} failed ({kind}): {message}")]
    FailFast {
        id: String,
        kind: FailureKind,
        message: String,
    },

    #[error("S3 upload is enabled but no uploader was provided")]
    UploaderRequired,

    #[error("failed to start state writer: {0}")]
    WriterSpawn(#[source] std::io::Error),

    #[error("state writer stopped unexpectedly")]
    WriterStopped,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
