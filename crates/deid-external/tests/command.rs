//! Integration tests running real commands through the de-identifier adapter.
#![cfg(unix)]

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use deid_engine::{DeidentifyError, Deidentifier};
use deid_external::CommandDeidentifier;
use tempfile::TempDir;

fn shell(script: &str) -> CommandDeidentifier {
    let command: Vec<String> = ["sh", "-c", script, "{source}", "{destination}"]
        .iter()
        .map(ToString::to_string)
        .collect();
    CommandDeidentifier::new(&command).unwrap()
}

fn slide(dir: &TempDir) -> std::path::PathBuf {
    let source = dir.path().join("a.svs");
    fs::write(&source, b"slide with label").unwrap();
    source
}

#[test]
fn successful_command_writes_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = slide(&dir);
    let destination = dir.path().join("out.svs.partial");

    shell(r#"cp "$0" "$1""#).deidentify(&source, &destination, None).unwrap();

    assert_eq!(fs::read(&destination).unwrap(), b"slide with label");
    assert_eq!(fs::read(&source).unwrap(), b"slide with label");
}

#[test]
fn non_zero_exit_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let source = slide(&dir);

    let err = shell("echo 'unsupported TIFF layout' >&2; exit 3")
        .deidentify(&source, &dir.path().join("out.svs.partial"), None)
        .unwrap_err();

    match err {
        DeidentifyError::Failed { program, status, stderr } => {
            assert_eq!(program, "sh");
            assert!(status.contains('3'));
            assert_eq!(stderr, "unsupported TIFF layout");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn modifying_the_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = slide(&dir);

    let err = shell(r#"echo tampered >> "$0"; cp "$0" "$1""#)
        .deidentify(&source, &dir.path().join("out.svs.partial"), None)
        .unwrap_err();

    assert!(matches!(err, DeidentifyError::SourceModified { .. }));
}

#[test]
fn timed_out_command_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let source = slide(&dir);
    let destination = dir.path().join("out.svs.partial");
    let marker = dir.path().join("finished");
    let script = format!(r#"sleep 2; cp "$0" "$1"; touch "{}""#, marker.display());

    let started = Instant::now();
    let err = shell(&script)
        .deidentify(&source, &destination, Some(Duration::from_millis(200)))
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        DeidentifyError::TimedOut { program, limit } => {
            assert_eq!(program, "sh");
            assert_eq!(limit, Duration::from_millis(200));
        }
        other => panic!("unexpected error: {other}"),
    }

    thread::sleep(Duration::from_secs(3));
    assert!(!marker.exists());
    assert!(!destination.exists());
}

#[test]
fn fast_command_finishes_within_limit() {
    let dir = tempfile::tempdir().unwrap();
    let source = slide(&dir);
    let destination = dir.path().join("out.svs.partial");

    shell(r#"cp "$0" "$1""#)
        .deidentify(&source, &destination, Some(Duration::from_secs(10)))
        .unwrap();

    assert_eq!(fs::read(&destination).unwrap(), b"slide with label");
}
