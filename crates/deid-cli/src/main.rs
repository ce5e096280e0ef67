//! `svs-deid`: de-identify the slides listed in a manifest.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;

use deid_cli::cli::{Cli, Command, InputArgs, LogFormatArg, LogLevelArg, RunArgs};
use deid_cli::commands::{RunOutcome, exit, run, validate_manifest};
use deid_cli::config::{EnvMap, FileConfig, env_from_process, resolve_dry_run, resolve_run};
use deid_cli::logging::{LogConfig, LogFormat, init_logging};
use deid_cli::summary::{print_summary, print_validation};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(exit::FATAL);
    }
    let show_progress = io::stderr().is_terminal();
    let env = env_from_process();

    let exit_code = match &cli.command {
        Command::Run(args) => finish(run_command(args, &env, show_progress)),
        Command::DryRun(input) => finish(dry_run_command(input, &env)),
        Command::ValidateManifest(args) => match validate_manifest(&args.manifest) {
            Ok(rows) => {
                print_validation(&args.manifest, rows);
                exit::SUCCESS
            }
            Err(error) => report_error(&error),
        },
    };
    std::process::exit(exit_code);
}

fn run_command(args: &RunArgs, env: &EnvMap, show_progress: bool) -> Result<RunOutcome> {
    let file = load_file_config(&args.input)?;
    let config = resolve_run(args, &file, env).context("resolve configuration")?;
    run(&config, show_progress && !config.dry_run)
}

fn dry_run_command(input: &InputArgs, env: &EnvMap) -> Result<RunOutcome> {
    let file = load_file_config(input)?;
    let config = resolve_dry_run(input, &file, env).context("resolve configuration")?;
    run(&config, false)
}

fn load_file_config(input: &InputArgs) -> Result<FileConfig> {
    match &input.config {
        Some(path) => Ok(FileConfig::load(path)?),
        None => Ok(FileConfig::default()),
    }
}

fn finish(result: Result<RunOutcome>) -> i32 {
    match result {
        Ok(outcome) => {
            print_summary(&outcome);
            outcome.exit_code()
        }
        Err(error) => report_error(&error),
    }
}

fn report_error(error: &anyhow::Error) -> i32 {
    eprintln!("error: {error:#}");
    exit::FATAL
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.log_data = cli.log_data;
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
