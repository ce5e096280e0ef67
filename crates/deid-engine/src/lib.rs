//! Run-state engine for the SVS de-identification pipeline.
//!
//! Each [`WorkItem`](deid_model::WorkItem) moves through
//! `pending -> deidentified -> uploaded -> done` (or straight to `done`
//! without S3), exactly once per run:
//!
//! - [`RunEngine`] runs one stage at a time and reports a transition only
//!   after the state writer has made it durable
//! - [`StateWriter`] is the single owner of the run state and `run.json`
//! - [`resume`] re-verifies a checkpoint's claims before trusting them
//! - [`run_items`] feeds items to a bounded worker pool
//!
//! The de-identifier and uploader sit behind the [`Deidentifier`] and
//! [`Uploader`] traits. The de-identifier enforces its own time limit and
//! stops its work on expiry; uploader calls go through [`call_with_timeout`].

mod checkpoint;
mod collaborators;
mod engine;
mod error;
mod resume;
mod run;
mod scheduler;
mod timeout;
mod writer;

pub use checkpoint::{CHECKPOINT_FILE, Checkpoint};
pub use collaborators::{Deidentifier, Uploader};
pub use engine::{Artifact, RunEngine, StageResult};
pub use error::{
    CallError, CheckpointError, DeidentifyError, EngineError, ResumeError, UploadError,
};
pub use resume::{Regression, ResumeReport, resume};
pub use run::{Collaborators, execute};
pub use scheduler::{ScheduleOptions, ScheduleOutcome, run_items};
pub use timeout::call_with_timeout;
pub use writer::{StateWriter, WriterHandle};
