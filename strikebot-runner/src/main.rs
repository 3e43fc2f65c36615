#![forbid(unsafe_code)]

//! `strikebot`: trading loop, settlement, reports, calibration and research tools for Kalshi
//! crypto strike markets.
//!
//! Every subcommand is a separate process invocation; commands share state only through the
//! files under the data root. Exit codes: 0 nominal, 1 threshold breached, 2 failure.

mod app;
mod cli;
mod commands;
mod error;

use crate::{
    app::App,
    cli::{Cli, Command},
    error::{EXIT_FAILURE, Outcome, RunnerError},
};
use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use strikebot_strategy::StrikebotConfig;
use tracing::error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("failed to load .env: {error}");
        }
    }

    if let Err(error) = init_logging(cli.json_logs) {
        eprintln!("{error}");
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(error) => {
            error!(kind = %error.kind(), %error, "command failed");
            eprintln!("error: {error}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_logging(json: bool) -> Result<(), RunnerError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(cfg!(debug_assertions)).try_init()
    };
    result.map_err(|e| RunnerError::Logging(e.to_string()))
}

async fn run(cli: Cli) -> Result<Outcome, RunnerError> {
    let config = StrikebotConfig::load(cli.config.as_deref())?;
    let app = App::new(config, cli.dry_run);
    let now = Utc::now();

    match cli.command {
        Command::Scan => commands::scan(&app).await,
        Command::Run => commands::run(&app).await,
        Command::PlaceOrder(args) => commands::place_order(&app, args).await,
        Command::Positions => commands::positions(&app).await,
        Command::Balance => commands::balance(&app).await,
        Command::Report { kind } => commands::report(&app, kind, now),
        Command::Recalibrate(args) => commands::recalibrate(&app, args, now).await,
        Command::Backtest(args) => commands::run_backtest(&app, args, now),
        Command::Sweep { days } => commands::run_sweep(&app, days, now),
        Command::SpreadCheck => commands::spread_check(&app, now).await,
        Command::Probe => commands::probe(&app).await,
        Command::VolStats => commands::vol_stats(&app, now).await,
        Command::ResetBreaker => commands::reset_breaker(&app, now),
        Command::Settle { validate } => commands::settle(&app, validate, now).await,
        Command::Calibration => commands::calibration(&app, now),
        Command::LatencyCheck => commands::latency_check(&app, now),
    }
}
