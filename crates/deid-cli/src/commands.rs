use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, info_span, warn};

use deid_engine::{
    Checkpoint, Collaborators, ResumeReport, ScheduleOutcome, StageResult, Uploader, execute,
    resume,
};
use deid_external::{CommandDeidentifier, S3Uploader};
use deid_ingest::{HashedNaming, plan_work_items, read_manifest};
use deid_model::{RunConfig, RunState, StageCounts, WorkItem};
use deid_report::{ReportPaths, write_reports};

use crate::logging::redact_value;
use crate::summary::Progress;

/// Process exit codes.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FATAL: i32 = 1;
    pub const ITEMS_FAILED: i32 = 2;
}

/// Everything a finished `run` or `dry-run` reports back.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// `None` for a dry run over an output directory that already holds a run.
    pub reports: Option<ReportPaths>,
    pub schedule: ScheduleOutcome,
    pub resume: Option<ResumeReport>,
}

impl RunOutcome {
    #[must_use]
    pub fn counts(&self) -> StageCounts {
        self.state.counts()
    }

    /// 0 when every item is done, for dry runs, and for failures under
    /// `allow_partial`; 2 when items failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let config = &self.state.config;
        if self.state.dry_run || config.allow_partial || self.counts().failed == 0 {
            exit::SUCCESS
        } else {
            exit::ITEMS_FAILED
        }
    }
}

/// Check a manifest and return the number of valid rows.
pub fn validate_manifest(manifest: &Path) -> Result<usize> {
    let rows = read_manifest(manifest)?;
    for row in &rows {
        debug!(
            line = row.line,
            rid = redact_value(&row.rid),
            specnum = redact_value(&row.specnum_formatted),
            "manifest row"
        );
    }
    let naming = HashedNaming::default();
    plan_work_items(&rows, Path::new("."), &naming)?;
    info!(rows = rows.len(), manifest = %manifest.display(), "manifest is valid");
    Ok(rows.len())
}

/// Run the pipeline with the shipped de-identifier and uploader.
pub fn run(config: &RunConfig, show_progress: bool) -> Result<RunOutcome> {
    if config.dry_run {
        return run_with(config, None, show_progress);
    }
    let collaborators = connect(config)?;
    run_with(config, Some(&collaborators), show_progress)
}

/// Build the collaborators `config` asks for.
pub fn connect(config: &RunConfig) -> Result<Collaborators> {
    let deidentifier = CommandDeidentifier::new(&config.deid_command)
        .context("configure de-identifier")?;
    let uploader = match &config.s3 {
        Some(target) => {
            let uploader = S3Uploader::connect(target.region.as_deref())
                .with_context(|| format!("connect to S3 bucket {}", target.bucket))?;
            Some(Arc::new(uploader) as Arc<dyn Uploader>)
        }
        None => None,
    };
    Ok(Collaborators {
        deidentifier: Arc::new(deidentifier),
        uploader,
    })
}

/// Run the pipeline against the given collaborators. A dry run needs none.
///
/// Nothing is written under the output directory until the manifest has
/// been read and every destination planned.
pub fn run_with(
    config: &RunConfig,
    collaborators: Option<&Collaborators>,
    show_progress: bool,
) -> Result<RunOutcome> {
    let span = info_span!(
        "pipeline",
        out_dir = %config.out_dir.display(),
        dry_run = config.dry_run
    );
    let _guard = span.enter();
    let start = Instant::now();

    let rows = read_manifest(&config.manifest)?;
    let items = plan_work_items(&rows, &config.out_dir, &HashedNaming::default())?;
    info!(items = items.len(), "manifest planned");

    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("create output directory {}", config.out_dir.display()))?;
    let checkpoint = Checkpoint::in_dir(&config.out_dir);

    if config.dry_run {
        return dry_run(config, items, &checkpoint, start);
    }
    let collaborators = collaborators.context("a run needs a de-identifier")?;

    let (state, resume_report) = if config.resume && checkpoint.exists() {
        let persisted = checkpoint.load().context("load run journal")?.into_state();
        let (state, report) = resume(persisted, items, config, collaborators.uploader.clone())
            .context("resume from run journal")?;
        log_resume(&report);
        (state, Some(report))
    } else {
        if config.resume {
            warn!(
                path = %checkpoint.path().display(),
                "no run journal to resume from; starting fresh"
            );
        } else if checkpoint.exists() {
            warn!(
                path = %checkpoint.path().display(),
                "replacing the existing run journal (use --resume to continue it)"
            );
        }
        (RunState::new(config.clone(), items), None)
    };

    let unfinished = state.counts().unfinished();
    let scheduled = config.max_files.map_or(unfinished, |limit| limit.min(unfinished));
    let progress = Progress::new(scheduled, show_progress);
    let on_progress = |result: &StageResult| progress.observe(result);
    let (state, schedule) = execute(state, config, collaborators, checkpoint, &on_progress)
        .context("run pipeline")?;
    progress.finish();

    let reports = write_reports(&state, &config.out_dir).context("write reports")?;
    let counts = state.counts();
    info!(
        done = counts.done,
        failed = counts.failed,
        unfinished = counts.unfinished(),
        deferred = schedule.deferred,
        duration_ms = start.elapsed().as_millis(),
        "run complete"
    );
    Ok(RunOutcome {
        state,
        reports: Some(reports),
        schedule,
        resume: resume_report,
    })
}

/// Plan and report without calling any collaborator. Items stay pending.
///
/// Reports are written only into an output directory with no run journal;
/// an existing run's reports and journal are left as they are and the plan
/// is logged instead.
fn dry_run(
    config: &RunConfig,
    items: Vec<WorkItem>,
    checkpoint: &Checkpoint,
    start: Instant,
) -> Result<RunOutcome> {
    let state = RunState::new(config.clone(), items);
    let reports = if checkpoint.exists() {
        warn!(
            path = %checkpoint.path().display(),
            "output directory holds a run; dry run writes no reports"
        );
        for item in &state.items {
            debug!(
                id = %item.id,
                destination = %item.destination.display(),
                "planned"
            );
        }
        None
    } else {
        Some(write_reports(&state, &config.out_dir).context("write reports")?)
    };
    info!(
        items = state.items.len(),
        duration_ms = start.elapsed().as_millis(),
        "dry run complete"
    );
    Ok(RunOutcome {
        state,
        reports,
        schedule: ScheduleOutcome::default(),
        resume: None,
    })
}

fn log_resume(report: &ResumeReport) {
    info!(
        resumed_from = %report.resumed_from,
        added = report.added.len(),
        regressed = report.regressions.len(),
        retried = report.retried.len(),
        partials_removed = report.partials_removed,
        "resuming"
    );
    for regression in &report.regressions {
        warn!(
            id = %regression.id,
            from = %regression.from,
            to = %regression.to,
            reason = %regression.reason,
            "stage not confirmed"
        );
    }
}
