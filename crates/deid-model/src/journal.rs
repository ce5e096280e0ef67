//! The `run.json` document.
//!
//! The same document serves as the resume checkpoint (rewritten after every
//! stage transition) and as the final run report. It is derived entirely
//! from a [`RunState`], so writing the same state twice yields identical
//! bytes.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TOOL_VERSION;
use crate::run_state::{RunState, StageCounts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJournal {
    pub tool_version: String,
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub manifest_name: String,
    pub manifest_path_hash: String,
    pub counts: StageCounts,
    pub state: RunState,
}

impl RunJournal {
    pub fn from_state(state: &RunState) -> Self {
        let manifest = &state.config.manifest;
        Self {
            tool_version: TOOL_VERSION.to_string(),
            schema_version: state.schema_version,
            generated_at: state.updated_at,
            manifest_name: manifest
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            manifest_path_hash: manifest_path_hash(manifest),
            counts: state.counts(),
            state: state.clone(),
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn into_state(self) -> RunState {
        self.state
    }
}

/// SHA-256 of the manifest path, so the journal identifies the manifest
/// without recording where it lives.
#[must_use]
pub fn manifest_path_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    hex::encode(digest)
}
