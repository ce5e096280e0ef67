//! Error types for manifest ingestion.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One manifest row that failed validation, with every reason found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub line: u64,
    pub reasons: Vec<String>,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reasons.join("; "))
    }
}

/// Errors that abort a run before any item is processed.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file not found.
    #[error("manifest not found: {path}")]
    NotFound { path: PathBuf },

    /// Failed to read or parse the CSV.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Failed to determine the working directory for relative locations.
    #[error("failed to resolve working directory: {source}")]
    WorkingDirectory {
        #[source]
        source: std::io::Error,
    },

    /// Required columns absent from the header.
    #[error("manifest {path} is missing required columns: {}", .columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// Header present but no data rows.
    #[error("manifest {path} has no rows")]
    Empty { path: PathBuf },

    /// One or more rows failed validation.
    #[error("manifest {path} has {} invalid row(s):\n{}", .rows.len(), format_issues(.rows))]
    InvalidRows { path: PathBuf, rows: Vec<RowIssue> },
}

fn format_issues(rows: &[RowIssue]) -> String {
    rows.iter()
        .map(|row| format!("  {row}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rows that map to the same destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub destination: PathBuf,
    pub rids: Vec<String>,
    pub lines: Vec<u64>,
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.lines.iter().map(u64::to_string).collect();
        write!(
            f,
            "{} <- rids [{}] (lines {})",
            self.destination.display(),
            self.rids.join(", "),
            lines.join(", ")
        )
    }
}

#[derive(Debug, Error)]
#[error("{} destination collision(s):\n{}", .collisions.len(), format_collisions(.collisions))]
pub struct CollisionError {
    pub collisions: Vec<Collision>,
}

fn format_collisions(collisions: &[Collision]) -> String {
    collisions
        .iter()
        .map(|collision| format!("  {collision}"))
        .collect::<Vec<_>>()
        .join("\n")
}
