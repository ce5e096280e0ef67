use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Columns every manifest must carry.
pub const REQUIRED_MANIFEST_COLUMNS: [&str; 4] = ["location", "rid", "specnum_formatted", "stain"];

/// One validated manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    /// 0-based position in file order.
    pub index: usize,
    /// 1-based CSV line the row was read from.
    pub line: u64,
    /// Resolved slide path.
    pub location: PathBuf,
    pub rid: String,
    pub specnum_formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stain: Option<String>,
}

impl ManifestRow {
    /// Stain value for reports, empty when the manifest left it blank.
    #[must_use]
    pub fn stain_or_empty(&self) -> &str {
        self.stain.as_deref().unwrap_or("")
    }
}
