//! Report generation for the SVS de-identification pipeline.
//!
//! Every report is a pure function of a [`RunState`]: the same state always
//! produces byte-identical files, items appear in manifest order, and each
//! file is replaced atomically.
//!
//! | Report | Path |
//! |--------|------|
//! | Status | `status/status.csv` |
//! | Run journal | `run.json` |
//! | Submission | `submission/submission.csv` |
//! | S3 manifest | `s3_manifest.csv` (S3 runs only) |
//! | Derived map | `derived/source_destination.csv` |

mod csv_out;
mod error;
mod manifests;
mod status;
mod submission;

use std::path::{Path, PathBuf};

use deid_common::atomic_write;
use deid_model::{RunJournal, RunState};

pub use error::{ReportError, Result};
pub use manifests::{DERIVED_CSV, S3_MANIFEST_CSV, write_derived_csv, write_s3_manifest};
pub use status::{STATUS_COLUMNS, STATUS_CSV, write_status_csv};
pub use submission::{SUBMISSION_COLUMNS, SUBMISSION_CSV, SubmissionRecord, write_submission_csv};

/// Location of the run journal under the output directory.
pub const RUN_JOURNAL: &str = "run.json";

/// Paths of the reports written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub status: PathBuf,
    pub run_journal: PathBuf,
    pub submission: PathBuf,
    pub s3_manifest: Option<PathBuf>,
    pub derived: PathBuf,
}

/// Write `run.json` for `state`.
pub fn write_run_journal(state: &RunState, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(RUN_JOURNAL);
    let bytes = RunJournal::from_state(state)
        .to_json_bytes()
        .map_err(ReportError::Journal)?;
    atomic_write(&path, &bytes)?;
    Ok(path)
}

/// Write every report for `state` under `out_dir`.
pub fn write_reports(state: &RunState, out_dir: &Path) -> Result<ReportPaths> {
    let derived = write_derived_csv(state, out_dir)?;
    let status = write_status_csv(state, out_dir)?;
    let submission = write_submission_csv(state, out_dir)?;
    let s3_manifest = write_s3_manifest(state, out_dir)?;
    let run_journal = write_run_journal(state, out_dir)?;
    tracing::info!(out_dir = %out_dir.display(), items = state.items.len(), "reports written");
    Ok(ReportPaths {
        status,
        run_journal,
        submission,
        s3_manifest,
        derived,
    })
}
