//! End-to-end runs through the command layer with a shell de-identifier.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use deid_cli::commands::{exit, run, validate_manifest};
use deid_ingest::ManifestError;
use deid_model::{RunConfig, Stage};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    fn calls_log(&self) -> PathBuf {
        self.root().join("calls.log")
    }

    /// Write slides and a manifest listing them, one `(file, stain)` per row.
    fn manifest(&self, slides: &[(&str, &str)]) -> PathBuf {
        let slide_dir = self.root().join("slides");
        fs::create_dir_all(&slide_dir).unwrap();
        let mut text = String::from("location,rid,specnum_formatted,stain\n");
        for (index, (name, stain)) in slides.iter().enumerate() {
            let path = slide_dir.join(name);
            fs::write(&path, format!("slide {name} with label")).unwrap();
            text.push_str(&format!(
                "{},RID{index:03},S-{index:04},{stain}\n",
                path.display()
            ));
        }
        let manifest = self.root().join("manifest.csv");
        fs::write(&manifest, text).unwrap();
        manifest
    }

    /// A config whose de-identifier copies the slide and logs each call.
    /// Sources with `bad` in their path fail.
    fn config(&self, manifest: &Path) -> RunConfig {
        let script = format!(
            r#"echo "$0" >> "{log}"; case "$0" in *bad*) echo "cannot read slide" >&2; exit 3;; esac; cp "$0" "$1""#,
            log = self.calls_log().display()
        );
        let mut config = RunConfig::new(manifest, self.out());
        config.deid_command = ["sh", "-c", script.as_str(), "{source}", "{destination}"]
            .iter()
            .map(ToString::to_string)
            .collect();
        config
    }

    fn calls(&self) -> usize {
        fs::read_to_string(self.calls_log())
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    fn status(&self) -> String {
        fs::read_to_string(self.out().join("status/status.csv")).unwrap()
    }
}

fn stage_column(status: &str) -> Vec<String> {
    status
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(4).unwrap().to_string())
        .collect()
}

#[test]
fn dry_run_plans_without_calling_the_deidentifier() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("b.svs", "")]);
    let mut config = fixture.config(&manifest);
    config.dry_run = true;

    let outcome = run(&config, false).unwrap();

    assert_eq!(outcome.exit_code(), exit::SUCCESS);
    assert_eq!(fixture.calls(), 0);
    assert_eq!(stage_column(&fixture.status()), vec!["pending", "pending"]);
    assert!(!fixture.out().join("svs").exists());
    let submission = fs::read_to_string(&outcome.reports.as_ref().unwrap().submission).unwrap();
    assert_eq!(submission.lines().count(), 1);
    assert!(fixture.out().join("derived/source_destination.csv").exists());
}

#[test]
fn missing_slide_fails_before_any_output() {
    let fixture = Fixture::new();
    let manifest = fixture.root().join("manifest.csv");
    fs::write(
        &manifest,
        "location,rid,specnum_formatted,stain\n/nonexistent/slide.svs,RID1,S-1,H&E\n",
    )
    .unwrap();

    let err = run(&fixture.config(&manifest), false).unwrap_err();

    match err.downcast_ref::<ManifestError>() {
        Some(ManifestError::InvalidRows { rows, .. }) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].line, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fixture.out().exists());
}

#[test]
fn local_run_copies_every_slide() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("b.svs", "")]);

    let outcome = run(&fixture.config(&manifest), false).unwrap();

    assert_eq!(outcome.exit_code(), exit::SUCCESS);
    assert_eq!(outcome.counts().done, 2);
    for item in &outcome.state.items {
        assert_eq!(item.stage, Stage::Done);
        assert_eq!(
            fs::read(&item.destination).unwrap(),
            fs::read(&item.source).unwrap()
        );
    }
    let submission = fs::read_to_string(&outcome.reports.as_ref().unwrap().submission).unwrap();
    assert_eq!(submission.lines().count(), 3);
    assert!(submission.contains("SVS formatted file of H&E-stained WSI"));
    assert!(submission.contains("SVS formatted file of WSI"));
    assert!(outcome.reports.as_ref().unwrap().s3_manifest.is_none());
}

#[test]
fn a_failed_row_sets_the_exit_code() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("bad.svs", "H&E"), ("c.svs", "H&E")]);

    let outcome = run(&fixture.config(&manifest), false).unwrap();

    assert_eq!(outcome.exit_code(), exit::ITEMS_FAILED);
    assert_eq!(stage_column(&fixture.status()), vec!["done", "failed", "done"]);
    assert!(fixture.status().contains("cannot read slide"));

    let mut config = fixture.config(&manifest);
    config.allow_partial = true;
    config.resume = true;
    let outcome = run(&config, false).unwrap();
    assert_eq!(outcome.exit_code(), exit::SUCCESS);
    assert_eq!(outcome.counts().failed, 1);
}

#[test]
fn resume_finishes_deferred_items_only() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("b.svs", "H&E"), ("c.svs", "")]);

    let mut config = fixture.config(&manifest);
    config.max_files = Some(1);
    let first = run(&config, false).unwrap();
    assert_eq!(first.counts().done, 1);
    assert_eq!(first.counts().pending, 2);
    assert_eq!(first.schedule.deferred, 2);
    assert_eq!(fixture.calls(), 1);

    let mut config = fixture.config(&manifest);
    config.resume = true;
    let second = run(&config, false).unwrap();
    assert_eq!(second.counts().done, 3);
    assert_eq!(second.state.resumed_from.as_deref(), Some(first.state.run_id.as_str()));
    assert_eq!(fixture.calls(), 3);

    // Nothing left to do.
    let third = run(&config, false).unwrap();
    assert_eq!(third.counts().done, 3);
    assert_eq!(fixture.calls(), 3);
}

#[test]
fn dry_run_leaves_a_finished_run_alone() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("b.svs", "PAS")]);
    let first = run(&fixture.config(&manifest), false).unwrap();
    let reports = first.reports.unwrap();
    let files = [
        reports.run_journal,
        reports.status,
        reports.submission,
        reports.derived,
    ];
    let before: Vec<Vec<u8>> = files.iter().map(|path| fs::read(path).unwrap()).collect();

    let mut config = fixture.config(&manifest);
    config.dry_run = true;
    let outcome = run(&config, false).unwrap();

    assert!(outcome.reports.is_none());
    assert_eq!(outcome.exit_code(), exit::SUCCESS);
    let after: Vec<Vec<u8>> = files.iter().map(|path| fs::read(path).unwrap()).collect();
    assert_eq!(after, before);
    assert_eq!(stage_column(&fixture.status()), vec!["done", "done"]);
    assert_eq!(fixture.calls(), 2);
}

#[test]
fn validation_counts_rows() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(&[("a.svs", "H&E"), ("b.svs", "PAS")]);

    assert_eq!(validate_manifest(&manifest).unwrap(), 2);
    assert!(!fixture.out().exists());
}
