//! CLI argument definitions for `svs-deid`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "svs-deid",
    version,
    about = "De-identify SVS slides listed in a manifest",
    long_about = "De-identify whole-slide images listed in a manifest CSV.\n\n\
                  Writes hashed copies of each slide, optionally uploads them to S3,\n\
                  and keeps a resumable run journal plus status and submission reports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow manifest values such as rid and specimen numbers in logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// De-identify, optionally upload, and report every manifest row.
    Run(RunArgs),

    /// Validate and plan without touching any slide.
    DryRun(InputArgs),

    /// Check a manifest and report every invalid row.
    ValidateManifest(ValidateArgs),
}

/// Inputs shared by `run` and `dry-run`.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Manifest CSV with location, rid, specnum_formatted and stain columns.
    #[arg(long = "manifest", value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Output directory for slides, reports and the run journal.
    #[arg(long = "out", value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// YAML configuration file. Command-line flags take precedence.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Plan and report without calling the de-identifier or uploader.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Upload de-identified slides to this bucket.
    #[arg(long = "s3-bucket", value_name = "BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix for uploaded objects.
    #[arg(long = "s3-prefix", value_name = "PREFIX")]
    pub s3_prefix: Option<String>,

    /// AWS region of the bucket.
    #[arg(long = "s3-region", value_name = "REGION")]
    pub s3_region: Option<String>,

    /// Delete each local slide once its upload is confirmed.
    #[arg(long = "no-local")]
    pub no_local: bool,

    /// Continue from the run journal in the output directory.
    #[arg(long = "resume")]
    pub resume: bool,

    /// On resume, give failed items another attempt.
    #[arg(long = "retry-failed")]
    pub retry_failed: bool,

    /// Number of slides processed concurrently.
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Exit successfully even when some slides failed.
    #[arg(long = "allow-partial")]
    pub allow_partial: bool,

    /// Stop starting new slides after the first failure.
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Process at most N slides in this run.
    #[arg(long = "max-files", value_name = "N")]
    pub max_files: Option<usize>,

    /// Give up on a de-identify or upload call after S seconds.
    #[arg(long = "timeout-secs", value_name = "S")]
    pub timeout_secs: Option<u64>,

    /// De-identifier command line, with {source} and {destination} placeholders.
    #[arg(long = "deid-command", value_name = "COMMAND")]
    pub deid_command: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Manifest CSV to check.
    #[arg(long = "manifest", value_name = "PATH")]
    pub manifest: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
