//! Test doubles and fixtures shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use deid_engine::{Checkpoint, Collaborators, DeidentifyError, Deidentifier, UploadError, Uploader};
use deid_model::{ManifestRow, RemoteObject, RunConfig, S3Target, WorkItem};
use tempfile::TempDir;

/// Writes `DEID:` followed by the source bytes.
#[derive(Default)]
pub struct FakeDeidentifier {
    pub calls: Mutex<Vec<PathBuf>>,
    pub fail_sources: HashSet<String>,
    pub empty_output: HashSet<String>,
    pub delay: Option<Duration>,
}

impl FakeDeidentifier {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_sources: names.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Deidentifier for FakeDeidentifier {
    fn deidentify(
        &self,
        source: &Path,
        destination: &Path,
        limit: Option<Duration>,
    ) -> Result<(), DeidentifyError> {
        self.calls.lock().unwrap().push(source.to_path_buf());
        if let Some(delay) = self.delay {
            if let Some(limit) = limit
                && limit < delay
            {
                thread::sleep(limit);
                return Err(DeidentifyError::TimedOut {
                    program: "fake".to_string(),
                    limit,
                });
            }
            thread::sleep(delay);
        }
        let name = file_name(source);
        if self.fail_sources.contains(&name) {
            return Err(DeidentifyError::Other(format!("cannot parse {name}")));
        }
        let io = |err: std::io::Error| DeidentifyError::Other(err.to_string());
        if self.empty_output.contains(&name) {
            return fs::write(destination, b"").map_err(io);
        }
        let mut bytes = b"DEID:".to_vec();
        bytes.extend(fs::read(source).map_err(io)?);
        fs::write(destination, bytes).map_err(io)
    }
}

/// In-memory object store.
#[derive(Default)]
pub struct FakeUploader {
    pub objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub puts: Mutex<Vec<String>>,
    pub fail_puts: Mutex<bool>,
}

impl FakeUploader {
    pub fn failing() -> Self {
        let uploader = Self::default();
        *uploader.fail_puts.lock().unwrap() = true;
        uploader
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn forget(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
    }
}

impl Uploader for FakeUploader {
    fn put(&self, local: &Path, bucket: &str, key: &str) -> Result<RemoteObject, UploadError> {
        self.puts.lock().unwrap().push(key.to_string());
        if *self.fail_puts.lock().unwrap() {
            return Err(UploadError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                attempts: 3,
                message: "access denied".to_string(),
            });
        }
        let bytes = fs::read(local).map_err(|err| UploadError::Local {
            path: local.to_path_buf(),
            message: err.to_string(),
        })?;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(RemoteObject::new(bucket, key))
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, UploadError> {
        Ok(self.object(bucket, key).is_some())
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Scratch directory with source slides and an output root.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::in_dir(&self.out_dir())
    }

    pub fn config(&self) -> RunConfig {
        RunConfig::new(self.dir.path().join("manifest.csv"), self.out_dir())
    }

    pub fn s3_config(&self, keep_local: bool) -> RunConfig {
        self.config()
            .with_s3(S3Target {
                bucket: "slides".to_string(),
                prefix: Some("/batch-1/".to_string()),
                region: None,
            })
            .with_keep_local(keep_local)
    }

    /// One pending item per name, with the source file created.
    pub fn items(&self, names: &[&str]) -> Vec<WorkItem> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let source = self.dir.path().join("slides").join(name);
                fs::create_dir_all(source.parent().unwrap()).unwrap();
                fs::write(&source, format!("slide {name}")).unwrap();
                let row = ManifestRow {
                    index,
                    line: index as u64 + 2,
                    location: source.clone(),
                    rid: format!("RID{index:03}"),
                    specnum_formatted: format!("SPEC{index:03}"),
                    stain: Some("H&E".to_string()),
                };
                let destination = self.out_dir().join("svs").join(format!("svs_{index:016x}.svs"));
                WorkItem::new(row, source, destination)
            })
            .collect()
    }
}

pub fn collaborators(
    deidentifier: &Arc<FakeDeidentifier>,
    uploader: Option<&Arc<FakeUploader>>,
) -> Collaborators {
    Collaborators {
        deidentifier: Arc::clone(deidentifier) as Arc<dyn Deidentifier>,
        uploader: uploader.map(|uploader| Arc::clone(uploader) as Arc<dyn Uploader>),
    }
}

pub fn no_progress(_: &deid_engine::StageResult) {}
