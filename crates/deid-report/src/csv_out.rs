//! Shared CSV encoding.

use std::path::Path;

use csv::{Terminator, WriterBuilder};
use deid_common::atomic_write;
use serde::Serialize;

use crate::error::{ReportError, Result};

/// Encode `rows` under `header`. The header is written even when there
/// are no rows.
pub(crate) fn encode_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<Vec<u8>> {
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.into_inner().map_err(|err| ReportError::Buffer {
        path: path.to_path_buf(),
        source: err.into_error(),
    })
}

/// Encode and atomically write a CSV report.
pub(crate) fn write_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let bytes = encode_csv(path, header, rows)?;
    atomic_write(path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "report written");
    Ok(())
}
