// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;
mod format;

use clap::{Parser, Subcommand};
use commands::SchemaKind;
use jct_config::HarnessConfig;
use jct_core::{TestReport, TestResult};
use jct_error::{EXIT_OK, ErrorCode, HarnessError};
use jct_runtime::{RunOptions, Runner};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jmap-test", version, about = "JMAP mail server conformance tests")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Comma-separated check ids, substrings or globs (e.g. `email/query*`).
    #[arg(long, global = true)]
    filter: Option<String>,

    /// Destroy existing mailboxes and emails before seeding.
    #[arg(short, long, global = true)]
    force: bool,

    /// Write the JSON report here instead of stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Only print progress lines for failed checks.
    #[arg(long, global = true)]
    fail_only: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the selected checks (the default).
    Run,

    /// List the checks a run would execute, without contacting a server.
    List,

    /// Print a JSON schema.
    Schema {
        /// Which schema to print.
        #[arg(value_enum, default_value_t = SchemaKind::Config)]
        kind: SchemaKind,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(cause) = std::error::Error::source(&err) {
                eprintln!("  caused by: {cause}");
            }
            if let Some(hint) = err.code.hint() {
                eprintln!("  hint: {hint}");
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn dispatch(mut cli: Cli) -> Result<i32, HarnessError> {
    match cli.command.take() {
        Some(Commands::Schema { kind }) => {
            let json = commands::schema_json(kind).map_err(internal)?;
            println!("{json}");
            Ok(EXIT_OK)
        }
        Some(Commands::List) => cmd_list(cli.config, cli.filter),
        Some(Commands::Run) | None => {
            let path = cli.config.take().ok_or_else(|| {
                HarnessError::new(ErrorCode::ConfigUnreadable, "no configuration file given (-c)")
            })?;
            let (config, warnings) = commands::load(&path)?;
            init_tracing(&config, cli.verbose);
            for warning in warnings {
                warn!(target: "jct.config", "{warning}");
            }
            cmd_run(config, cli).await
        }
    }
}

fn init_tracing(config: &HarnessConfig, verbose: bool) {
    let directive = if verbose || config.verbose {
        "jct=debug".to_string()
    } else {
        format!("jct={}", config.log_level.as_deref().unwrap_or("info"))
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_list(config: Option<PathBuf>, filter: Option<String>) -> Result<i32, HarnessError> {
    let config = match config {
        Some(path) => commands::load(&path)?.0,
        None => HarnessConfig::default(),
    };
    let runner = Runner::new(
        jct_suite::catalog(),
        RunOptions {
            filter,
            ..RunOptions::default()
        },
    );
    let selected = runner.selected(&config);
    for test in &selected {
        println!("{}", format::descriptor_line(test));
    }
    eprintln!("{} checks", selected.len());
    Ok(EXIT_OK)
}

async fn cmd_run(config: HarnessConfig, cli: Cli) -> Result<i32, HarnessError> {
    let options = RunOptions {
        filter: cli.filter,
        force_destroy: cli.force,
        fail_only: cli.fail_only,
    };
    let server = config.session_url.clone().unwrap_or_default();
    info!(target: "jct.cli", "Testing {server}");

    let started = Instant::now();
    let mut observer = |index: usize, total: usize, result: &TestResult| {
        eprintln!("{}", format::progress_line(index, total, result));
    };
    let results = jct_runtime::run(&config, jct_suite::catalog(), options, &mut observer).await?;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let report = TestReport::new(server, duration_ms, results);
    eprintln!("{}", format::summary_line(&report.summary, duration_ms));
    commands::write_report(&report, cli.output.as_deref()).map_err(internal)?;
    Ok(report.exit_code())
}

fn internal(err: anyhow::Error) -> HarnessError {
    HarnessError::new(ErrorCode::Internal, format!("{err:#}"))
}
