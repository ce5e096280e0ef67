//! Integration tests for driving items through the stage machine.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{FakeDeidentifier, FakeUploader, Workspace, collaborators, no_progress};
use deid_common::{partial_path, sha256_file};
use deid_engine::{StageResult, execute};
use deid_model::{FailureKind, RunState, Stage};

#[test]
fn local_run_finishes_every_item() {
    let ws = Workspace::new();
    let config = ws.config();
    let deid = Arc::new(FakeDeidentifier::default());
    let state = RunState::new(config.clone(), ws.items(&["a.svs", "b.svs"]));

    let (state, outcome) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    assert_eq!(outcome.processed, 2);
    assert!(state.is_complete());
    for item in &state.items {
        assert_eq!(item.attempts, 1);
        assert!(item.remote.is_none());
        let bytes = fs::read(&item.destination).unwrap();
        assert!(bytes.starts_with(b"DEID:"));
        assert_eq!(item.sha256.as_deref(), Some(sha256_file(&item.destination).unwrap().as_str()));
        assert_eq!(item.size_bytes, Some(bytes.len() as u64));
        assert!(!partial_path(&item.destination).exists());
    }
    // Sources are never touched.
    assert_eq!(fs::read(&state.items[0].source).unwrap(), b"slide a.svs");
}

#[test]
fn second_of_three_fails_with_one_worker() {
    let ws = Workspace::new();
    let config = ws.config().with_workers(1);
    let deid = Arc::new(FakeDeidentifier::failing_on(&["b.svs"]));
    let state = RunState::new(config.clone(), ws.items(&["a.svs", "b.svs", "c.svs"]));

    let (state, outcome) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    assert_eq!(outcome.processed, 3);
    assert!(!outcome.stopped_early);
    let stages: Vec<Stage> = state.items.iter().map(|item| item.stage).collect();
    assert_eq!(stages, vec![Stage::Done, Stage::Failed, Stage::Done]);

    let failure = state.items[1].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Deidentify);
    assert_eq!(failure.stage, Stage::Pending);
    assert!(failure.message.contains("cannot parse b.svs"));
    assert!(!state.items[1].destination.exists());

    let on_disk = ws.checkpoint().load().unwrap().into_state();
    assert_eq!(on_disk, state);
}

#[test]
fn upload_precedes_local_deletion() {
    let ws = Workspace::new();
    let config = ws.s3_config(false);
    let deid = Arc::new(FakeDeidentifier::default());
    let uploader = Arc::new(FakeUploader::default());
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let (state, _) = execute(
        state,
        &config,
        &collaborators(&deid, Some(&uploader)),
        ws.checkpoint(),
        &no_progress,
    )
    .unwrap();

    let item = &state.items[0];
    assert_eq!(item.stage, Stage::Done);
    assert!(item.local_deleted);
    assert!(!item.destination.exists());

    let key = format!("batch-1/{}", item.file_name());
    let remote = item.remote.as_ref().unwrap();
    assert_eq!(remote.key, key);
    assert_eq!(remote.uri, format!("s3://slides/{key}"));
    // The object holds the verified artifact, so it was read before removal.
    let object = uploader.object("slides", &key).unwrap();
    assert!(object.starts_with(b"DEID:"));
    assert_eq!(item.size_bytes, Some(object.len() as u64));
}

#[test]
fn kept_local_copy_survives_upload() {
    let ws = Workspace::new();
    let config = ws.s3_config(true);
    let deid = Arc::new(FakeDeidentifier::default());
    let uploader = Arc::new(FakeUploader::default());
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let (state, _) = execute(
        state,
        &config,
        &collaborators(&deid, Some(&uploader)),
        ws.checkpoint(),
        &no_progress,
    )
    .unwrap();

    let item = &state.items[0];
    assert_eq!(item.stage, Stage::Done);
    assert!(!item.local_deleted);
    assert!(item.destination.exists());
    assert_eq!(item.attempts, 3);
}

#[test]
fn failed_upload_keeps_local_artifact() {
    let ws = Workspace::new();
    let config = ws.s3_config(false);
    let deid = Arc::new(FakeDeidentifier::default());
    let uploader = Arc::new(FakeUploader::failing());
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let (state, _) = execute(
        state,
        &config,
        &collaborators(&deid, Some(&uploader)),
        ws.checkpoint(),
        &no_progress,
    )
    .unwrap();

    let item = &state.items[0];
    assert_eq!(item.stage, Stage::Failed);
    let failure = item.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Upload);
    assert_eq!(failure.stage, Stage::Deidentified);
    assert!(item.destination.exists());
    assert!(!item.local_deleted);
    assert!(item.sha256.is_some());
}

#[test]
fn empty_output_is_an_artifact_failure() {
    let ws = Workspace::new();
    let config = ws.config();
    let deid = Arc::new(FakeDeidentifier {
        empty_output: ["a.svs".to_string()].into_iter().collect(),
        ..FakeDeidentifier::default()
    });
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let (state, _) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    let item = &state.items[0];
    assert_eq!(item.stage, Stage::Failed);
    assert_eq!(item.failure.as_ref().unwrap().kind, FailureKind::Artifact);
    assert!(!item.destination.exists());
    assert!(!partial_path(&item.destination).exists());
}

#[test]
fn slow_deidentifier_times_out() {
    let ws = Workspace::new();
    let config = ws.config().with_timeout_secs(Some(1));
    let deid = Arc::new(FakeDeidentifier {
        delay: Some(Duration::from_secs(3)),
        ..FakeDeidentifier::default()
    });
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let (state, _) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    let failure = state.items[0].failure.as_ref().unwrap();
    assert_eq!(state.items[0].stage, Stage::Failed);
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(failure.message.contains("timed out after 1s"));
}

#[test]
fn fail_fast_stops_scheduling() {
    let ws = Workspace::new();
    let config = ws.config().with_workers(1).with_fail_fast(true);
    let deid = Arc::new(FakeDeidentifier::failing_on(&["a.svs"]));
    let state = RunState::new(config.clone(), ws.items(&["a.svs", "b.svs", "c.svs"]));

    let (state, outcome) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    assert!(outcome.stopped_early);
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.deferred, 2);
    assert_eq!(deid.call_count(), 1);
    let stages: Vec<Stage> = state.items.iter().map(|item| item.stage).collect();
    assert_eq!(stages, vec![Stage::Failed, Stage::Pending, Stage::Pending]);
}

#[test]
fn max_files_defers_the_rest() {
    let ws = Workspace::new();
    let config = ws.config().with_max_files(Some(2));
    let deid = Arc::new(FakeDeidentifier::default());
    let state = RunState::new(config.clone(), ws.items(&["a.svs", "b.svs", "c.svs"]));

    let (state, outcome) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress).unwrap();

    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.deferred, 1);
    let counts = state.counts();
    assert_eq!(counts.done, 2);
    assert_eq!(counts.pending, 1);
    assert_eq!(state.items[2].stage, Stage::Pending);
}

#[test]
fn parallel_workers_keep_manifest_order() {
    let ws = Workspace::new();
    let config = ws.config().with_workers(4);
    let deid = Arc::new(FakeDeidentifier::default());
    let names: Vec<String> = (0..12).map(|i| format!("slide-{i:02}.svs")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let state = RunState::new(config.clone(), ws.items(&names));
    let seen = Mutex::new(Vec::new());
    let on_progress = |result: &StageResult| seen.lock().unwrap().push(result.index);

    let (state, outcome) =
        execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &on_progress).unwrap();

    assert_eq!(outcome.processed, 12);
    assert!(state.is_complete());
    let indices: Vec<usize> = state.items.iter().map(|item| item.index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
    let mut seen = seen.into_inner().unwrap();
    seen.sort_unstable();
    assert_eq!(seen, (0..12).collect::<Vec<_>>());
}

#[test]
fn uploads_need_an_uploader() {
    let ws = Workspace::new();
    let config = ws.s3_config(true);
    let deid = Arc::new(FakeDeidentifier::default());
    let state = RunState::new(config.clone(), ws.items(&["a.svs"]));

    let err = execute(state, &config, &collaborators(&deid, None), ws.checkpoint(), &no_progress)
        .unwrap_err();

    assert!(matches!(err, deid_engine::EngineError::UploaderRequired));
    assert_eq!(deid.call_count(), 0);
}
