//! Manifest CSV reader.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use deid_model::{ManifestRow, REQUIRED_MANIFEST_COLUMNS};

use crate::error::{ManifestError, RowIssue};

/// Read and validate a manifest, resolving relative locations against the
/// current working directory and then the manifest's own directory.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>, ManifestError> {
    let cwd = std::env::current_dir().map_err(|source| ManifestError::WorkingDirectory { source })?;
    read_manifest_from(path, &cwd)
}

/// Same as [`read_manifest`] with an explicit working directory.
///
/// Every row is checked before returning, so a manifest with several bad
/// rows reports all of them in one [`ManifestError::InvalidRows`].
pub fn read_manifest_from(path: &Path, cwd: &Path) -> Result<Vec<ManifestRow>, ManifestError> {
    if !path.is_file() {
        return Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let manifest_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|source| read_error(path, source))?;

    let headers = reader
        .headers()
        .map_err(|source| read_error(path, source))?
        .clone();
    let columns = column_positions(&headers);

    let missing: Vec<String> = REQUIRED_MANIFEST_COLUMNS
        .iter()
        .filter(|name| !columns.contains_key(**name))
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ManifestError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let mut rows = Vec::new();
    let mut issues = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| read_error(path, source))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, csv::Position::line);
        let field = |name: &str| {
            columns
                .get(name)
                .and_then(|idx| record.get(*idx))
                .unwrap_or("")
        };

        let raw_location = field("location");
        let rid = field("rid");
        let specnum = field("specnum_formatted");
        let stain = field("stain");

        let mut reasons = Vec::new();
        let location = if raw_location.is_empty() {
            reasons.push("missing location".to_string());
            None
        } else {
            let resolved = resolve_location(raw_location, cwd, &manifest_dir);
            if resolved.is_none() {
                reasons.push(format!("location not found or unreadable: {raw_location}"));
            }
            resolved
        };
        if rid.is_empty() {
            reasons.push("missing rid".to_string());
        }
        if specnum.is_empty() {
            reasons.push("missing specnum_formatted".to_string());
        }

        match location {
            Some(location) if reasons.is_empty() => rows.push(ManifestRow {
                index: rows.len(),
                line,
                location,
                rid: rid.to_string(),
                specnum_formatted: specnum.to_string(),
                stain: (!stain.is_empty()).then(|| stain.to_string()),
            }),
            _ => issues.push(RowIssue { line, reasons }),
        }
    }

    if !issues.is_empty() {
        tracing::warn!(
            path = %path.display(),
            invalid = issues.len(),
            "manifest has invalid rows"
        );
        return Err(ManifestError::InvalidRows {
            path: path.to_path_buf(),
            rows: issues,
        });
    }
    if rows.is_empty() {
        return Err(ManifestError::Empty {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "manifest loaded");
    Ok(rows)
}

/// Resolve a manifest `location`: absolute paths as-is, relative paths
/// against `cwd` first and then `manifest_dir`. Only readable regular files
/// resolve.
pub fn resolve_location(raw: &str, cwd: &Path, manifest_dir: &Path) -> Option<PathBuf> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return is_readable_file(candidate).then(|| candidate.to_path_buf());
    }
    [cwd, manifest_dir]
        .into_iter()
        .map(|base| base.join(candidate))
        .find(|joined| is_readable_file(joined))
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

/// Map normalized header names to their column index. The first occurrence
/// of a duplicated header wins.
fn column_positions(headers: &StringRecord) -> BTreeMap<String, usize> {
    let mut positions = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        positions.entry(normalize_header(header)).or_insert(idx);
    }
    positions
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn read_error(path: &Path, source: csv::Error) -> ManifestError {
    ManifestError::Read {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header("\u{feff} Location "), "location");
        assert_eq!(normalize_header("SPECNUM_FORMATTED"), "specnum_formatted");
    }

    #[test]
    fn first_duplicate_header_wins() {
        let headers = StringRecord::from(vec!["rid", "RID", "location"]);
        let positions = column_positions(&headers);
        assert_eq!(positions.get("rid"), Some(&0));
        assert_eq!(positions.get("location"), Some(&2));
    }
}
