//! Source/destination planning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use deid_model::{ManifestRow, WorkItem};

use crate::error::{Collision, CollisionError};
use crate::naming::DestinationNaming;

/// Directory under the output root that holds de-identified slides.
pub const SLIDE_DIR: &str = "svs";

/// One row of `derived/source_destination.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDestination {
    pub index: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Map every row to a destination under `out_dir/svs/`.
///
/// Fails with every colliding destination when two rows would write the
/// same file. Output order follows the manifest.
pub fn build_source_destinations(
    rows: &[ManifestRow],
    out_dir: &Path,
    naming: &dyn DestinationNaming,
) -> Result<Vec<SourceDestination>, CollisionError> {
    let slide_dir = out_dir.join(SLIDE_DIR);
    let pairs: Vec<SourceDestination> = rows
        .iter()
        .map(|row| SourceDestination {
            index: row.index,
            source: row.location.clone(),
            destination: slide_dir.join(naming.file_name(row)),
        })
        .collect();

    let mut by_destination: BTreeMap<&Path, Vec<&ManifestRow>> = BTreeMap::new();
    for (pair, row) in pairs.iter().zip(rows) {
        by_destination.entry(pair.destination.as_path()).or_default().push(row);
    }
    let collisions: Vec<Collision> = by_destination
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(destination, rows)| Collision {
            destination: destination.to_path_buf(),
            rids: rows.iter().map(|row| row.rid.clone()).collect(),
            lines: rows.iter().map(|row| row.line).collect(),
        })
        .collect();

    if collisions.is_empty() {
        Ok(pairs)
    } else {
        tracing::warn!(count = collisions.len(), "destination collisions");
        Err(CollisionError { collisions })
    }
}

/// Build the initial work items for a fresh run.
pub fn plan_work_items(
    rows: &[ManifestRow],
    out_dir: &Path,
    naming: &dyn DestinationNaming,
) -> Result<Vec<WorkItem>, CollisionError> {
    let pairs = build_source_destinations(rows, out_dir, naming)?;
    Ok(rows
        .iter()
        .zip(pairs)
        .map(|(row, pair)| WorkItem::new(row.clone(), pair.source, pair.destination))
        .collect())
}
