use std::path::{Path, PathBuf};

use deid_model::{RunState, StatusRecord};

use crate::csv_out::write_csv;
use crate::error::Result;

/// Location of the status report under the output directory.
pub const STATUS_CSV: &str = "status/status.csv";

/// Columns of `status.csv`, in [`StatusRecord`] field order.
pub const STATUS_COLUMNS: [&str; 15] = [
    "id",
    "index",
    "source_hash",
    "destination",
    "stage",
    "failed_stage",
    "error_kind",
    "error",
    "sha256",
    "size_bytes",
    "s3_uri",
    "local_deleted",
    "attempts",
    "created_at",
    "updated_at",
];

/// Write one row per item, in manifest order.
pub fn write_status_csv(state: &RunState, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(STATUS_CSV);
    let mut items: Vec<_> = state.items.iter().collect();
    items.sort_by_key(|item| item.index);
    write_csv(&path, &STATUS_COLUMNS, items.into_iter().map(StatusRecord::from))?;
    Ok(path)
}
