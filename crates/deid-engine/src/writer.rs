//! Single-writer persistence.
//!
//! One thread owns the [`RunState`] and the checkpoint file. Workers send
//! each transitioned [`WorkItem`] over a channel and block until the new
//! snapshot is on disk, so writes never interleave and a worker never
//! proceeds past a transition that was not persisted.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use deid_model::{RunState, WorkItem};

use crate::checkpoint::Checkpoint;
use crate::error::EngineError;

type Ack = Sender<Result<(), EngineError>>;

struct Commit {
    item: WorkItem,
    ack: Ack,
}

/// Owner of the writer thread. [`finish`](Self::finish) returns the final
/// state once every [`WriterHandle`] has been dropped.
pub struct StateWriter {
    handle: JoinHandle<RunState>,
    tx: Sender<Commit>,
}

/// Cloneable sender used by workers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: Sender<Commit>,
}

impl StateWriter {
    /// Persist `state` once, then start the writer thread.
    pub fn spawn(state: RunState, checkpoint: Checkpoint) -> Result<Self, EngineError> {
        checkpoint.save(&state)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("deid-state-writer".to_string())
            .spawn(move || writer_loop(state, &checkpoint, &rx))
            .map_err(EngineError::WriterSpawn)?;
        Ok(Self { handle, tx })
    }

    #[must_use]
    pub fn handle(&self) -> WriterHandle {
        WriterHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop the writer and return the final state.
    pub fn finish(self) -> Result<RunState, EngineError> {
        drop(self.tx);
        self.handle.join().map_err(|_| EngineError::WriterStopped)
    }
}

impl WriterHandle {
    /// Store `item` in the run state and wait until it is durable.
    ///
    /// Fails when the state rejects the item or the checkpoint cannot be
    /// written; the update is then not acknowledged.
    pub fn commit(&self, item: WorkItem) -> Result<(), EngineError> {
        let (ack, done) = crossbeam_channel::bounded(1);
        self.tx
            .send(Commit { item, ack })
            .map_err(|_| EngineError::WriterStopped)?;
        done.recv().map_err(|_| EngineError::WriterStopped)?
    }
}

fn writer_loop(mut state: RunState, checkpoint: &Checkpoint, rx: &Receiver<Commit>) -> RunState {
    for Commit { item, ack } in rx {
        let id = item.id.clone();
        let result = match state.apply(item) {
            Ok(()) => checkpoint.save(&state).map_err(EngineError::from),
            Err(err) => Err(EngineError::from(err)),
        };
        if let Err(err) = &result {
            tracing::error!(item = %id, error = %err, "state update not persisted");
        }
        // The worker may have given up waiting; the state is kept either way.
        let _ = ack.send(result);
    }
    state
}
