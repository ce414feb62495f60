pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use revpulse_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use revpulse_core::domain::dimension::{ReportSelection, Selection};

use crate::commands::{CommandResult, ReportRequest, EXIT_CONFIG};

#[derive(Debug, Parser)]
#[command(
    name = "revpulse",
    about = "Revpulse quarterly revenue reporting CLI",
    long_about = "Build bookings attainment, renewal forecast, and period comparison reports from a warehouse/CRM snapshot.",
    after_help = "Examples:\n  revpulse report --snapshot snapshot.json --regions AMER,EMEA\n  revpulse renewals --snapshot snapshot.json --as-of 2026-02-14\n  revpulse compare --snapshot snapshot.json --start 2026-01-01 --end 2026-02-14\n  revpulse doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a revpulse.toml (required to exist when given)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Bookings attainment rollup with RAG status and executive counts")]
    Report(ReportArgs),
    #[command(about = "Renewal forecast per product for the configured fiscal quarter")]
    Renewals(ReportArgs),
    #[command(about = "Compare a period with the equal-length period before it")]
    Compare(ReportArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, CRM readiness, and snapshot readability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Snapshot file to check")]
        snapshot: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    #[arg(long, help = "JSON snapshot of warehouse and CRM exports")]
    snapshot: PathBuf,
    #[arg(long, help = "Comma list of products, or ALL")]
    products: Option<String>,
    #[arg(long, help = "Comma list of regions, or ALL")]
    regions: Option<String>,
    #[arg(long, help = "Comma list of deal categories, or ALL")]
    categories: Option<String>,
    #[arg(long, help = "Comma list of lead sources, or ALL")]
    sources: Option<String>,
    #[arg(long, help = "Period start (YYYY-MM-DD)")]
    start: Option<NaiveDate>,
    #[arg(long, help = "Period end (YYYY-MM-DD)")]
    end: Option<NaiveDate>,
    #[arg(long, help = "Report date; defaults to the snapshot's asOf, then today")]
    as_of: Option<NaiveDate>,
}

impl ReportArgs {
    fn into_request(self) -> ReportRequest {
        ReportRequest {
            selection: ReportSelection {
                products: Selection::parse_param(self.products.as_deref()),
                regions: Selection::parse_param(self.regions.as_deref()),
                categories: Selection::parse_param(self.categories.as_deref()),
                sources: Selection::parse_param(self.sources.as_deref()),
            },
            snapshot: self.snapshot,
            start: self.start,
            end: self.end,
            as_of: self.as_of,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
    };

    let result = match cli.command {
        Command::Report(args) => with_config("report", options, |config| {
            commands::report::run(config, &args.into_request())
        }),
        Command::Renewals(args) => with_config("renewals", options, |config| {
            commands::renewals::run(config, &args.into_request())
        }),
        Command::Compare(args) => with_config("compare", options, |config| {
            commands::compare::run(config, &args.into_request())
        }),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(options) },
        Command::Doctor { json, snapshot } => CommandResult {
            exit_code: 0,
            output: commands::doctor::run(options, snapshot.as_deref(), json),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn with_config(
    command: &str,
    options: LoadOptions,
    run_command: impl FnOnce(&AppConfig) -> CommandResult,
) -> CommandResult {
    match AppConfig::load(options) {
        Ok(config) => {
            init_logging(&config);
            tracing::info!(
                event_name = "cli.command.started",
                correlation_id = "cli",
                command,
                "running command"
            );
            run_command(&config)
        }
        Err(error) => CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG),
    }
}

/// Logs go to stderr; stdout carries only the JSON payload.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "cli.logging.reused", "global subscriber already installed");
    }
}
