//! Pathology-file submission sheet.

use std::path::{Path, PathBuf};

use deid_model::{RunState, Stage, WorkItem};
use serde::Serialize;

use crate::csv_out::write_csv;
use crate::error::Result;

pub const SUBMISSION_CSV: &str = "submission/submission.csv";

pub const SUBMISSION_COLUMNS: [&str; 15] = [
    "type",
    "pathology_file_id",
    "sample.sample_id",
    "file_name",
    "file_url",
    "file_type",
    "file_size",
    "sha256sum",
    "file_mapping_level",
    "file_description",
    "image_modality",
    "staining_method",
    "deidentification_method",
    "fixation_embedding_method",
    "license",
];

/// Values shared by every pathology file record.
mod constants {
    pub const RECORD_TYPE: &str = "pathology_file";
    pub const FILE_TYPE: &str = "svs";
    pub const FILE_MAPPING_LEVEL: &str = "sample";
    pub const IMAGE_MODALITY: &str = "Slide Microscopy";
    pub const DEIDENTIFICATION_METHOD: &str = "automatic";
    pub const FIXATION_EMBEDDING_METHOD: &str = "Formalin fixed paraffin embedded (FFPE)";
    pub const LICENSE: &str = "NA";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub pathology_file_id: String,
    #[serde(rename = "sample.sample_id")]
    pub sample_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_type: &'static str,
    pub file_size: String,
    pub sha256sum: String,
    pub file_mapping_level: &'static str,
    pub file_description: String,
    pub image_modality: &'static str,
    pub staining_method: String,
    pub deidentification_method: &'static str,
    pub fixation_embedding_method: &'static str,
    pub license: &'static str,
}

impl SubmissionRecord {
    /// Record for a finished item; `None` for anything not done.
    #[must_use]
    pub fn for_item(item: &WorkItem) -> Option<Self> {
        if item.stage != Stage::Done {
            return None;
        }
        let stain = item.row.stain_or_empty();
        let file_url = match &item.remote {
            Some(remote) => remote.uri.clone(),
            None => item.destination.display().to_string(),
        };
        let file_description = if stain.is_empty() {
            "SVS formatted file of WSI".to_string()
        } else {
            format!("SVS formatted file of {stain}-stained WSI")
        };
        Some(Self {
            record_type: constants::RECORD_TYPE,
            pathology_file_id: item.id.clone(),
            sample_id: item.row.rid.clone(),
            file_name: item.file_name(),
            file_url,
            file_type: constants::FILE_TYPE,
            file_size: item.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
            sha256sum: item.sha256.clone().unwrap_or_default(),
            file_mapping_level: constants::FILE_MAPPING_LEVEL,
            file_description,
            image_modality: constants::IMAGE_MODALITY,
            staining_method: stain.to_string(),
            deidentification_method: constants::DEIDENTIFICATION_METHOD,
            fixation_embedding_method: constants::FIXATION_EMBEDDING_METHOD,
            license: constants::LICENSE,
        })
    }
}

/// Write one record per done item, in manifest order.
pub fn write_submission_csv(state: &RunState, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(SUBMISSION_CSV);
    let mut items: Vec<_> = state.items.iter().collect();
    items.sort_by_key(|item| item.index);
    write_csv(
        &path,
        &SUBMISSION_COLUMNS,
        items.into_iter().filter_map(SubmissionRecord::for_item),
    )?;
    Ok(path)
}
