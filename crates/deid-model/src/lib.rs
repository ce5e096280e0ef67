//! Data model for the SVS de-identification pipeline.
//!
//! Every other crate in the workspace speaks these types:
//!
//! - [`ManifestRow`]: one validated row of the input manifest
//! - [`WorkItem`]: per-row unit of work tracked through [`Stage`]s
//! - [`RunState`]: the ordered set of work items plus run metadata
//! - [`StatusRecord`]: the externally visible projection of a work item
//! - [`RunJournal`]: the on-disk form of `run.json` (checkpoint and report)
//! - [`RunConfig`]: the immutable configuration resolved once at startup

pub mod error;
pub mod journal;
pub mod manifest;
pub mod options;
pub mod run_state;
pub mod stage;
pub mod status;
pub mod work_item;

pub use error::{ModelError, Result};
pub use journal::{RunJournal, manifest_path_hash};
pub use manifest::{ManifestRow, REQUIRED_MANIFEST_COLUMNS};
pub use options::{DEFAULT_DEID_COMMAND, DEFAULT_WORKERS, RunConfig, S3Target};
pub use run_state::{CURRENT_SCHEMA_VERSION, RunState, StageCounts};
pub use stage::{Failure, FailureKind, Stage};
pub use status::{StatusRecord, format_timestamp, source_hash};
pub use work_item::{RemoteObject, WorkItem};

/// Version of the tool that produced a journal.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
