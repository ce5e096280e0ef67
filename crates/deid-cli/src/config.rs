//! Run configuration: command-line flags over a YAML file over environment
//! variables over defaults.
//!
//! The environment is read once in `main` into an [`EnvMap`] and passed in,
//! so resolution is a pure function of its three inputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use deid_model::{DEFAULT_WORKERS, RunConfig, S3Target};
use serde::Deserialize;
use thiserror::Error;

use crate::cli::{InputArgs, RunArgs};

/// Prefix shared by every recognised environment variable.
pub const ENV_PREFIX: &str = "SVS_DEID_";

/// Environment variables relevant to a run, by name.
pub type EnvMap = BTreeMap<String, String>;

mod keys {
    pub const MANIFEST: &str = "SVS_DEID_MANIFEST";
    pub const OUT_DIR: &str = "SVS_DEID_OUT_DIR";
    pub const S3_BUCKET: &str = "SVS_DEID_S3_BUCKET";
    pub const S3_PREFIX: &str = "SVS_DEID_S3_PREFIX";
    pub const S3_REGION: &str = "SVS_DEID_S3_REGION";
    pub const WORKERS: &str = "SVS_DEID_WORKERS";
    pub const DRY_RUN: &str = "SVS_DEID_DRY_RUN";
    pub const ALLOW_PARTIAL: &str = "SVS_DEID_ALLOW_PARTIAL";
    pub const FAIL_FAST: &str = "SVS_DEID_FAIL_FAST";
    pub const RESUME: &str = "SVS_DEID_RESUME";
    pub const RETRY_FAILED: &str = "SVS_DEID_RETRY_FAILED";
    pub const KEEP_LOCAL: &str = "SVS_DEID_KEEP_LOCAL";
    pub const MAX_FILES: &str = "SVS_DEID_MAX_FILES";
    pub const TIMEOUT_SECS: &str = "SVS_DEID_TIMEOUT_SECS";
    pub const COMMAND: &str = "SVS_DEID_COMMAND";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value {value:?} for {name}: expected {expected}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("no {field} given (use {flag}, the config file, or {env})")]
    Missing {
        field: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("--no-local requires an S3 bucket")]
    NoLocalWithoutBucket,

    #[error("an S3 prefix or region was given without a bucket")]
    S3WithoutBucket,

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },

    #[error("de-identifier command is empty")]
    EmptyCommand,
}

/// De-identifier command as written in YAML: one string or a list of arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Args(Vec<String>),
}

impl CommandSpec {
    fn into_args(self) -> Vec<String> {
        match self {
            Self::Line(line) => split_command(&line),
            Self::Args(args) => args,
        }
    }
}

/// Contents of the YAML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub manifest: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub s3_region: Option<String>,
    pub keep_local: Option<bool>,
    pub dry_run: Option<bool>,
    pub resume: Option<bool>,
    pub retry_failed: Option<bool>,
    pub allow_partial: Option<bool>,
    pub fail_fast: Option<bool>,
    pub workers: Option<usize>,
    pub max_files: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub deid_command: Option<CommandSpec>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Collect the `SVS_DEID_*` variables from the process environment.
pub fn env_from_process() -> EnvMap {
    std::env::vars()
        .filter(|(name, _)| name.starts_with(ENV_PREFIX))
        .collect()
}

/// Parse a boolean setting: `1/true/yes/y/on` or `0/false/no/n/off`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Split a command line on whitespace, honouring double quotes.
pub fn split_command(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

struct EnvReader<'a> {
    vars: &'a EnvMap,
}

impl EnvReader<'_> {
    fn string(&self, name: &'static str) -> Option<String> {
        self.vars
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn path(&self, name: &'static str) -> Option<PathBuf> {
        self.string(name).map(PathBuf::from)
    }

    fn flag(&self, name: &'static str) -> Result<Option<bool>, ConfigError> {
        self.string(name)
            .map(|value| {
                parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                    name,
                    value,
                    expected: "a boolean (1/0, true/false, yes/no, on/off)",
                })
            })
            .transpose()
    }

    fn number<T: std::str::FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        self.string(name)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidEnv {
                    name,
                    value,
                    expected: "a non-negative integer",
                })
            })
            .transpose()
    }
}

/// A boolean flag that can only switch a setting on.
fn switch(set: bool) -> Option<bool> {
    set.then_some(true)
}

/// Build the run configuration for `run`.
pub fn resolve_run(
    args: &RunArgs,
    file: &FileConfig,
    vars: &EnvMap,
) -> Result<RunConfig, ConfigError> {
    let env = EnvReader { vars };

    let manifest = required_path(
        args.input.manifest.as_ref(),
        file.manifest.as_ref(),
        &env,
        Field::Manifest,
    )?;
    let out_dir = required_path(
        args.input.out.as_ref(),
        file.out_dir.as_ref(),
        &env,
        Field::OutDir,
    )?;

    let bucket = args
        .s3_bucket
        .clone()
        .or_else(|| file.s3_bucket.clone())
        .or_else(|| env.string(keys::S3_BUCKET));
    let prefix = args
        .s3_prefix
        .clone()
        .or_else(|| file.s3_prefix.clone())
        .or_else(|| env.string(keys::S3_PREFIX));
    let region = args
        .s3_region
        .clone()
        .or_else(|| file.s3_region.clone())
        .or_else(|| env.string(keys::S3_REGION));
    let s3 = match bucket {
        Some(bucket) => Some(S3Target {
            bucket,
            prefix,
            region,
        }),
        None if prefix.is_some() || region.is_some() => {
            return Err(ConfigError::S3WithoutBucket);
        }
        None => None,
    };

    let keep_local = first_flag(
        args.no_local.then_some(false),
        file.keep_local,
        env.flag(keys::KEEP_LOCAL)?,
        true,
    );
    let dry_run = first_flag(switch(args.dry_run), file.dry_run, env.flag(keys::DRY_RUN)?, false);
    let workers = args
        .workers
        .or(file.workers)
        .or(env.number(keys::WORKERS)?)
        .unwrap_or(DEFAULT_WORKERS);
    let deid_command = match args.deid_command.as_deref() {
        Some(line) => Some(split_command(line)),
        None => file
            .deid_command
            .clone()
            .map(CommandSpec::into_args)
            .or_else(|| env.string(keys::COMMAND).map(|line| split_command(&line))),
    };

    let mut config = RunConfig::new(manifest, out_dir);
    config.s3 = s3;
    config.keep_local = keep_local;
    config.dry_run = dry_run;
    config.resume = first_flag(switch(args.resume), file.resume, env.flag(keys::RESUME)?, false);
    config.retry_failed = first_flag(
        switch(args.retry_failed),
        file.retry_failed,
        env.flag(keys::RETRY_FAILED)?,
        false,
    );
    config.allow_partial = first_flag(
        switch(args.allow_partial),
        file.allow_partial,
        env.flag(keys::ALLOW_PARTIAL)?,
        false,
    );
    config.fail_fast = first_flag(
        switch(args.fail_fast),
        file.fail_fast,
        env.flag(keys::FAIL_FAST)?,
        false,
    );
    config.workers = workers;
    config.max_files = args
        .max_files
        .or(file.max_files)
        .or(env.number(keys::MAX_FILES)?);
    config.timeout_secs = args
        .timeout_secs
        .or(file.timeout_secs)
        .or(env.number(keys::TIMEOUT_SECS)?);
    if let Some(command) = deid_command {
        config.deid_command = command;
    }

    validate(&config)?;
    Ok(config)
}

/// Build the configuration for `dry-run`: the same layering, with the
/// dry-run switch forced on.
pub fn resolve_dry_run(
    input: &InputArgs,
    file: &FileConfig,
    vars: &EnvMap,
) -> Result<RunConfig, ConfigError> {
    let args = RunArgs {
        input: input.clone(),
        dry_run: true,
        ..RunArgs::default()
    };
    resolve_run(&args, file, vars)
}

fn validate(config: &RunConfig) -> Result<(), ConfigError> {
    if config.workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    if config.max_files == Some(0) {
        return Err(ConfigError::Zero { name: "max_files" });
    }
    if config.timeout_secs == Some(0) {
        return Err(ConfigError::Zero {
            name: "timeout_secs",
        });
    }
    if !config.keep_local && config.s3.is_none() && !config.dry_run {
        return Err(ConfigError::NoLocalWithoutBucket);
    }
    if config.deid_command.is_empty() {
        return Err(ConfigError::EmptyCommand);
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Field {
    Manifest,
    OutDir,
}

fn required_path(
    flag: Option<&PathBuf>,
    file: Option<&PathBuf>,
    env: &EnvReader<'_>,
    field: Field,
) -> Result<PathBuf, ConfigError> {
    let (name, flag_name, env_name) = match field {
        Field::Manifest => ("manifest", "--manifest", keys::MANIFEST),
        Field::OutDir => ("output directory", "--out", keys::OUT_DIR),
    };
    flag.or(file)
        .cloned()
        .or_else(|| env.path(env_name))
        .ok_or(ConfigError::Missing {
            field: name,
            flag: flag_name,
            env: env_name,
        })
}

fn first_flag(cli: Option<bool>, file: Option<bool>, env: Option<bool>, default: bool) -> bool {
    cli.or(file).or(env).unwrap_or(default)
}
