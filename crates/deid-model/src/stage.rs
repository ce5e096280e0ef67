//! Stage machine for work items.
//!
//! ```text
//! Pending --deidentify--> Deidentified --upload--> Uploaded --finalize--> Done
//! Pending --deidentify (no upload)-------------------------------------> Done
//! any non-terminal --error--> Failed
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Deidentified,
    Uploaded,
    Done,
    Failed,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Pending,
        Self::Deidentified,
        Self::Uploaded,
        Self::Done,
        Self::Failed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deidentified => "deidentified",
            Self::Uploaded => "uploaded",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Position along the success path. `Failed` sits outside it.
    #[must_use]
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Deidentified => Some(1),
            Self::Uploaded => Some(2),
            Self::Done => Some(3),
            Self::Failed => None,
        }
    }

    /// Whether the stage machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (Self::Pending, Self::Deidentified | Self::Done) => true,
            (Self::Deidentified, Self::Uploaded) => true,
            (Self::Uploaded, Self::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown stage '{value}'"))
    }
}

/// Which operation produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external de-identifier reported an error.
    Deidentify,
    /// The de-identifier succeeded but its output failed verification.
    Artifact,
    /// The object-storage upload failed.
    Upload,
    /// Removing the local artifact after upload failed.
    Finalize,
    /// A collaborator call exceeded the configured timeout.
    Timeout,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deidentify => "deidentify",
            Self::Artifact => "artifact",
            Self::Upload => "upload",
            Self::Finalize => "finalize",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a work item reached [`Stage::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Stage the item was in when the operation failed.
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}
