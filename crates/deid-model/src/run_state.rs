use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::options::RunConfig;
use crate::stage::Stage;
use crate::work_item::WorkItem;

/// Schema version written to `run.json`. Bump on incompatible changes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Per-stage totals for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub total: usize,
    pub pending: usize,
    pub deidentified: usize,
    pub uploaded: usize,
    pub done: usize,
    pub failed: usize,
}

impl StageCounts {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            counts.total += 1;
            match item.stage {
                Stage::Pending => counts.pending += 1,
                Stage::Deidentified => counts.deidentified += 1,
                Stage::Uploaded => counts.uploaded += 1,
                Stage::Done => counts.done += 1,
                Stage::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Items that are neither done nor failed.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.pending + self.deidentified + self.uploaded
    }
}

/// Ordered work items plus run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub schema_version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Run id of the checkpoint this run continued from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
    pub config: RunConfig,
    pub items: Vec<WorkItem>,
}

impl RunState {
    pub fn new(config: RunConfig, mut items: Vec<WorkItem>) -> Self {
        items.sort_by_key(|item| item.index);
        let started_at = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            started_at,
            updated_at: started_at,
            dry_run: config.dry_run,
            resumed_from: None,
            config,
            items,
        }
    }

    #[must_use]
    pub fn counts(&self) -> StageCounts {
        StageCounts::from_items(&self.items)
    }

    /// True when every item reached `Done`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.stage == Stage::Done)
    }

    /// Replace the stored copy of an item with a newer one.
    pub fn apply(&mut self, item: WorkItem) -> Result<()> {
        let slot = self
            .items
            .iter_mut()
            .find(|existing| existing.index == item.index && existing.id == item.id)
            .ok_or_else(|| ModelError::UnknownItem {
                id: item.id.clone(),
                index: item.index,
            })?;
        if item.updated_at > self.updated_at {
            self.updated_at = item.updated_at;
        }
        *slot = item;
        Ok(())
    }
}
