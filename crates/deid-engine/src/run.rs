//! One complete engine pass over a run state.

use std::sync::Arc;

use deid_model::{RunConfig, RunState};

use crate::checkpoint::Checkpoint;
use crate::collaborators::{Deidentifier, Uploader};
use crate::engine::{RunEngine, StageResult};
use crate::error::EngineError;
use crate::scheduler::{ScheduleOptions, ScheduleOutcome, run_items};
use crate::writer::StateWriter;

/// Collaborators for a run.
#[derive(Clone)]
pub struct Collaborators {
    pub deidentifier: Arc<dyn Deidentifier>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

/// Persist `state`, drive its unfinished items, and return the final
/// state as held by the state writer.
pub fn execute(
    state: RunState,
    config: &RunConfig,
    collaborators: &Collaborators,
    checkpoint: Checkpoint,
    on_progress: &(dyn Fn(&StageResult) + Sync),
) -> Result<(RunState, ScheduleOutcome), EngineError> {
    let span = tracing::info_span!("run", run_id = %state.run_id);
    let _guard = span.enter();

    let items = state.items.clone();
    let writer = StateWriter::spawn(state, checkpoint)?;
    let engine = RunEngine::new(
        config,
        Arc::clone(&collaborators.deidentifier),
        collaborators.uploader.clone(),
        writer.handle(),
    );
    let outcome = match engine {
        Ok(engine) => {
            let options = ScheduleOptions {
                workers: config.workers,
                fail_fast: config.fail_fast,
                max_files: config.max_files,
            };
            run_items(&engine, items, options, on_progress)
        }
        Err(err) => Err(err),
    };

    // Every writer handle is gone once the engine is dropped.
    let final_state = writer.finish()?;
    Ok((final_state, outcome?))
}
