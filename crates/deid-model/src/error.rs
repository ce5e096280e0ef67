use thiserror::Error;

use crate::stage::Stage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A forward transition that the stage machine does not allow.
    #[error("work item {id}: invalid transition {from} -> {to}")]
    InvalidTransition { id: String, from: Stage, to: Stage },

    /// A resume regression that would move an item forward.
    #[error("work item {id}: cannot regress from {from} to {to}")]
    InvalidRegression { id: String, from: Stage, to: Stage },

    /// An update addressed an item the run does not contain.
    #[error("run has no work item {id} at index {index}")]
    UnknownItem { id: String, index: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
