//! External de-identification tool.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use deid_engine::{DeidentifyError, Deidentifier};

use crate::error::ExternalError;

pub const SOURCE_PLACEHOLDER: &str = "{source}";
pub const DESTINATION_PLACEHOLDER: &str = "{destination}";

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// How often a running tool is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `program args...` once per slide, substituting `{source}` and
/// `{destination}` in the arguments. A non-zero exit is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDeidentifier {
    program: String,
    args: Vec<String>,
}

impl CommandDeidentifier {
    pub fn new(command: &[String]) -> Result<Self, ExternalError> {
        let (program, args) = command.split_first().ok_or(ExternalError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(ExternalError::EmptyCommand);
        }
        if !args.iter().any(|arg| arg.contains(DESTINATION_PLACEHOLDER)) {
            return Err(ExternalError::MissingPlaceholder {
                placeholder: DESTINATION_PLACEHOLDER,
                command: command.join(" "),
            });
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn render_args(&self, source: &Path, destination: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                SOURCE_PLACEHOLDER => source.as_os_str().to_os_string(),
                DESTINATION_PLACEHOLDER => destination.as_os_str().to_os_string(),
                _ => arg
                    .replace(SOURCE_PLACEHOLDER, &source.to_string_lossy())
                    .replace(DESTINATION_PLACEHOLDER, &destination.to_string_lossy())
                    .into(),
            })
            .collect()
    }
}

impl Deidentifier for CommandDeidentifier {
    fn deidentify(
        &self,
        source: &Path,
        destination: &Path,
        limit: Option<Duration>,
    ) -> Result<(), DeidentifyError> {
        let before = fingerprint(source)?;
        let args = self.render_args(source, destination);
        tracing::trace!(program = %self.program, args = ?args, "running de-identifier");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DeidentifyError::Launch {
                program: self.program.clone(),
                source,
            })?;
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        // On error the stderr reader is left to finish once the pipe closes.
        let status = self.wait(&mut child, limit)?;
        let stderr = stderr
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(DeidentifyError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }

        if fingerprint(source)? != before {
            return Err(DeidentifyError::SourceModified {
                path: source.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl CommandDeidentifier {
    /// Wait for `child`, killing and reaping it once `limit` has passed.
    fn wait(
        &self,
        child: &mut Child,
        limit: Option<Duration>,
    ) -> Result<ExitStatus, DeidentifyError> {
        let wait_error = |err: std::io::Error| {
            DeidentifyError::Other(format!("failed to wait for {}: {err}", self.program))
        };
        let Some(limit) = limit else {
            return child.wait().map_err(wait_error);
        };
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= limit => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(
                        program = %self.program,
                        pid = child.id(),
                        limit_secs = limit.as_secs(),
                        "de-identifier killed after timeout"
                    );
                    return Err(DeidentifyError::TimedOut {
                        program: self.program.clone(),
                        limit,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(wait_error(err));
                }
            }
        }
    }
}

fn fingerprint(path: &Path) -> Result<(u64, Option<SystemTime>), DeidentifyError> {
    let meta = fs::metadata(path).map_err(|err| {
        DeidentifyError::Other(format!("failed to stat source {}: {err}", path.display()))
    })?;
    Ok((meta.len(), meta.modified().ok()))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "no stderr output".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn placeholders_are_substituted() {
        let deid = CommandDeidentifier::new(&command(&[
            "svs-deidentify",
            "--in={source}",
            "{destination}",
        ]))
        .unwrap();
        let args = deid.render_args(Path::new("/data/a b.svs"), Path::new("/out/svs/x.svs.partial"));
        assert_eq!(
            args,
            vec![
                OsString::from("--in=/data/a b.svs"),
                OsString::from("/out/svs/x.svs.partial")
            ]
        );
    }

    #[test]
    fn destination_placeholder_is_required() {
        let err = CommandDeidentifier::new(&command(&["strip", "{source}"])).unwrap_err();
        assert!(matches!(err, ExternalError::MissingPlaceholder { .. }));
        assert!(matches!(
            CommandDeidentifier::new(&[]).unwrap_err(),
            ExternalError::EmptyCommand
        ));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
        assert_eq!(stderr_tail(b""), "no stderr output");
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.svs");
        fs::write(&source, b"slide").unwrap();
        let deid = CommandDeidentifier::new(&command(&[
            "definitely-not-a-real-deidentifier",
            "{source}",
            "{destination}",
        ]))
        .unwrap();

        let err = deid
            .deidentify(&source, &dir.path().join("out.svs"), None)
            .unwrap_err();

        assert!(matches!(err, DeidentifyError::Launch { .. }));
    }
}
