//! Worker pool.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use deid_model::{Stage, WorkItem};

use crate::engine::{RunEngine, StageResult};
use crate::error::EngineError;

/// Scheduling knobs, taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    pub workers: usize,
    pub fail_fast: bool,
    pub max_files: Option<usize>,
}

/// How a call to [`run_items`] ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Items a worker drove to a terminal stage.
    pub processed: usize,
    /// Non-terminal items left untouched, by `max_files` or `fail_fast`.
    pub deferred: usize,
    /// `fail_fast` stopped scheduling after a failure.
    pub stopped_early: bool,
}

/// Drive every non-terminal item with a bounded pool of workers.
///
/// Each item is owned by exactly one worker while it is driven. With
/// `fail_fast`, no new item starts once any item fails; items already in
/// flight complete. Only fatal engine errors are returned.
pub fn run_items(
    engine: &RunEngine,
    items: Vec<WorkItem>,
    options: ScheduleOptions,
    on_progress: &(dyn Fn(&StageResult) + Sync),
) -> Result<ScheduleOutcome, EngineError> {
    let pending: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| !item.stage.is_terminal())
        .collect();
    let limit = options.max_files.unwrap_or(pending.len()).min(pending.len());
    let mut deferred = pending.len() - limit;
    let workers = options.workers.max(1).min(limit.max(1));

    let stop = AtomicBool::new(false);
    let processed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let fatal: Mutex<Option<EngineError>> = Mutex::new(None);

    tracing::info!(scheduled = limit, deferred, workers, "scheduling items");

    thread::scope(|scope| {
        let (tx, rx) = crossbeam_channel::bounded::<WorkItem>(workers);
        for worker in 0..workers {
            let rx = rx.clone();
            let (stop, processed, skipped, fatal) = (&stop, &processed, &skipped, &fatal);
            scope.spawn(move || {
                tracing::trace!(worker, "worker started");
                for mut item in &rx {
                    if stop.load(Ordering::SeqCst) {
                        skipped.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    match engine.drive(&mut item) {
                        Ok(result) => {
                            processed.fetch_add(1, Ordering::SeqCst);
                            if result.stage == Stage::Failed && options.fail_fast {
                                stop.store(true, Ordering::SeqCst);
                            }
                            on_progress(&result);
                        }
                        Err(EngineError::FailFast { id, kind, message }) => {
                            processed.fetch_add(1, Ordering::SeqCst);
                            stop.store(true, Ordering::SeqCst);
                            tracing::warn!(
                                item = %id,
                                kind = %kind,
                                error = %message,
                                "stopping after failure"
                            );
                            on_progress(&StageResult {
                                id,
                                index: item.index,
                                stage: Stage::Failed,
                                artifact: None,
                            });
                        }
                        Err(err) => {
                            stop.store(true, Ordering::SeqCst);
                            tracing::error!(error = %err, "worker stopped");
                            if let Ok(mut slot) = fatal.lock() {
                                slot.get_or_insert(err);
                            }
                        }
                    }
                }
            });
        }
        drop(rx);

        for item in pending.into_iter().take(limit) {
            if stop.load(Ordering::SeqCst) {
                skipped.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            if tx.send(item).is_err() {
                break;
            }
        }
        drop(tx);
    });

    if let Some(err) = fatal.into_inner().ok().flatten() {
        return Err(err);
    }

    deferred += skipped.into_inner();
    let stopped_early = stop.into_inner();
    let outcome = ScheduleOutcome {
        processed: processed.into_inner(),
        deferred,
        stopped_early,
    };
    tracing::info!(
        processed = outcome.processed,
        deferred = outcome.deferred,
        stopped_early,
        "scheduling finished"
    );
    Ok(outcome)
}
