//! Reconcile a checkpoint with the current manifest.
//!
//! A persisted stage is a claim, not a fact: before trusting it, resume
//! re-checks the evidence on disk and in object storage and rolls the item
//! back to the last stage whose evidence holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deid_common::{non_empty_file_len, partial_path, remove_if_exists, verify_sha256};
use deid_model::{RunConfig, RunState, S3Target, Stage, WorkItem};

use crate::collaborators::Uploader;
use crate::error::{CallError, ResumeError};
use crate::timeout::call_with_timeout;

/// An item moved back to an earlier stage during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regression {
    pub id: String,
    pub from: Stage,
    pub to: Stage,
    pub reason: String,
}

/// What resume changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub resumed_from: String,
    /// Items new in the manifest, added as pending.
    pub added: Vec<String>,
    pub regressions: Vec<Regression>,
    /// Failed items reset for another attempt.
    pub retried: Vec<String>,
    /// Stale `.partial` files removed.
    pub partials_removed: usize,
}

/// Build the state for a resumed run.
///
/// `fresh_items` are the work items planned from the current manifest.
/// Items are matched by id; new ones start pending, and checkpoint items
/// the manifest no longer lists are an error. The returned state carries
/// `config` and records the checkpoint's run id in `resumed_from`.
pub fn resume(
    persisted: RunState,
    fresh_items: Vec<WorkItem>,
    config: &RunConfig,
    uploader: Option<Arc<dyn Uploader>>,
) -> Result<(RunState, ResumeReport), ResumeError> {
    check_s3_target(persisted.config.s3.as_ref(), config.s3.as_ref())?;

    let mut report = ResumeReport {
        resumed_from: persisted.run_id.clone(),
        ..ResumeReport::default()
    };
    let verifier = Verifier {
        uploader,
        timeout: config.timeout(),
    };

    let mut previous: HashMap<String, WorkItem> = persisted
        .items
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect();

    let mut items = Vec::with_capacity(fresh_items.len());
    for fresh in fresh_items {
        let Some(mut item) = previous.remove(&fresh.id) else {
            report.added.push(fresh.id.clone());
            items.push(fresh);
            continue;
        };
        if item.destination != fresh.destination {
            return Err(ResumeError::DestinationChanged {
                id: item.id,
                previous: item.destination,
                current: fresh.destination,
            });
        }
        item.index = fresh.index;
        item.source = fresh.source;
        item.row = fresh.row;
        items.push(item);
    }

    if !previous.is_empty() {
        let mut ids: Vec<String> = previous.into_keys().collect();
        ids.sort();
        return Err(ResumeError::UnknownItems { ids });
    }

    for item in &mut items {
        if item.stage == Stage::Done {
            continue;
        }
        if remove_if_exists(&partial_path(&item.destination))? {
            report.partials_removed += 1;
        }
        if item.stage == Stage::Failed && !config.retry_failed {
            continue;
        }

        let claimed = item.progress_stage();
        let (verified, reason) = verifier.verified_stage(item, claimed);
        if verified == Stage::Pending && claimed != Stage::Pending {
            // Whatever is at the destination failed verification.
            remove_if_exists(&item.destination)?;
        }

        if item.stage == Stage::Failed {
            item.regress_to(verified)?;
            report.retried.push(item.id.clone());
            tracing::info!(item = %item.id, stage = %verified, "retrying failed item");
        } else if verified != claimed {
            item.regress_to(verified)?;
            let reason = reason.unwrap_or_default();
            tracing::warn!(
                item = %item.id,
                from = %claimed,
                to = %verified,
                reason = %reason,
                "stage regressed"
            );
            report.regressions.push(Regression {
                id: item.id.clone(),
                from: claimed,
                to: verified,
                reason,
            });
        }
    }

    let mut state = RunState::new(config.clone(), items);
    state.resumed_from = Some(report.resumed_from.clone());
    tracing::info!(
        resumed_from = %report.resumed_from,
        added = report.added.len(),
        regressed = report.regressions.len(),
        retried = report.retried.len(),
        "checkpoint reconciled"
    );
    Ok((state, report))
}

fn check_s3_target(
    previous: Option<&S3Target>,
    current: Option<&S3Target>,
) -> Result<(), ResumeError> {
    let unchanged = match (previous, current) {
        (Some(previous), Some(current)) => previous.same_destination(current),
        (None, None) => true,
        _ => false,
    };
    if unchanged {
        Ok(())
    } else {
        Err(ResumeError::S3TargetChanged {
            previous: describe_target(previous),
            current: describe_target(current),
        })
    }
}

fn describe_target(target: Option<&S3Target>) -> String {
    match target {
        Some(target) => format!("s3://{}/{}", target.bucket, target.key_for("")),
        None => "no upload".to_string(),
    }
}

struct Verifier {
    uploader: Option<Arc<dyn Uploader>>,
    timeout: Option<Duration>,
}

impl Verifier {
    /// Highest stage at or below `claimed` whose evidence holds, with the
    /// reason the claim was rejected.
    fn verified_stage(&self, item: &WorkItem, claimed: Stage) -> (Stage, Option<String>) {
        match claimed {
            Stage::Uploaded => match self.remote_exists(item) {
                Ok(()) => (Stage::Uploaded, None),
                Err(remote_reason) => match local_evidence(item) {
                    Ok(()) => (Stage::Deidentified, Some(remote_reason)),
                    Err(local_reason) => {
                        (Stage::Pending, Some(format!("{remote_reason}; {local_reason}")))
                    }
                },
            },
            Stage::Deidentified => match local_evidence(item) {
                Ok(()) => (Stage::Deidentified, None),
                Err(reason) => (Stage::Pending, Some(reason)),
            },
            _ => (Stage::Pending, None),
        }
    }

    fn remote_exists(&self, item: &WorkItem) -> Result<(), String> {
        let Some(remote) = item.remote.clone() else {
            return Err("no remote object recorded".to_string());
        };
        let Some(uploader) = self.uploader.clone() else {
            return Err("no uploader available to confirm remote object".to_string());
        };
        let uri = remote.uri.clone();
        let lookup = call_with_timeout(self.timeout, move || {
            uploader.exists(&remote.bucket, &remote.key)
        });
        match lookup {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("remote object {uri} not found")),
            Err(CallError::Failed(err)) => Err(err.to_string()),
            Err(CallError::TimedOut(limit)) => Err(format!(
                "lookup of {uri} timed out after {}s",
                limit.as_secs()
            )),
            Err(CallError::Spawn(err)) => Err(format!("lookup of {uri} could not start: {err}")),
            Err(CallError::Panicked) => Err(format!("lookup of {uri} panicked")),
        }
    }
}

fn local_evidence(item: &WorkItem) -> Result<(), String> {
    let destination = &item.destination;
    let Some(size) = non_empty_file_len(destination) else {
        return Err(format!(
            "artifact missing or empty: {}",
            destination.display()
        ));
    };
    if let Some(expected) = item.size_bytes
        && expected != size
    {
        return Err(format!(
            "artifact size {size} differs from recorded {expected}: {}",
            destination.display()
        ));
    }
    if let Some(expected) = &item.sha256 {
        match verify_sha256(destination, expected) {
            Ok(true) => {}
            Ok(false) => {
                return Err(format!(
                    "artifact digest mismatch: {}",
                    destination.display()
                ));
            }
            Err(err) => return Err(err.to_string()),
        }
    }
    Ok(())
}
