//! Path listings: the derived source/destination map and the S3 manifest.

use std::path::{Path, PathBuf};

use deid_model::RunState;
use serde::Serialize;

use crate::csv_out::write_csv;
use crate::error::Result;

pub const DERIVED_CSV: &str = "derived/source_destination.csv";
pub const S3_MANIFEST_CSV: &str = "s3_manifest.csv";

const DERIVED_COLUMNS: [&str; 2] = ["source", "destination"];
const S3_MANIFEST_COLUMNS: [&str; 5] = ["id", "local_path", "bucket", "key", "s3_uri"];

#[derive(Serialize)]
struct DerivedRecord {
    source: String,
    destination: String,
}

#[derive(Serialize)]
struct S3ManifestRecord<'a> {
    id: &'a str,
    local_path: String,
    bucket: &'a str,
    key: &'a str,
    s3_uri: &'a str,
}

/// Write the planned `source -> destination` mapping in manifest order.
pub fn write_derived_csv(state: &RunState, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(DERIVED_CSV);
    let mut items: Vec<_> = state.items.iter().collect();
    items.sort_by_key(|item| item.index);
    let rows = items.into_iter().map(|item| DerivedRecord {
        source: item.source.display().to_string(),
        destination: item.destination.display().to_string(),
    });
    write_csv(&path, &DERIVED_COLUMNS, rows)?;
    Ok(path)
}

/// Write one row per uploaded object. Returns `None` without writing when
/// the run has no S3 target.
pub fn write_s3_manifest(state: &RunState, out_dir: &Path) -> Result<Option<PathBuf>> {
    if !state.config.upload_enabled() {
        return Ok(None);
    }
    let path = out_dir.join(S3_MANIFEST_CSV);
    let mut items: Vec<_> = state.items.iter().collect();
    items.sort_by_key(|item| item.index);
    let rows = items.into_iter().filter_map(|item| {
        item.remote.as_ref().map(|remote| S3ManifestRecord {
            id: &item.id,
            local_path: item.destination.display().to_string(),
            bucket: &remote.bucket,
            key: &remote.key,
            s3_uri: &remote.uri,
        })
    });
    write_csv(&path, &S3_MANIFEST_COLUMNS, rows)?;
    Ok(Some(path))
}
