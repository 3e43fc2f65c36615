use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use strikebot_instrument::Side;
use strikebot_strategy::backtest::VolScenario;

/// Kalshi crypto strike trader.
#[derive(Debug, Parser)]
#[command(name = "strikebot", version, about)]
pub struct Cli {
    /// JSON configuration file (default: strikebot.json when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Paper trade: read markets from Kalshi, fill orders synthetically.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single trading tick.
    Scan,
    /// Run trading ticks on the configured interval until interrupted.
    Run,
    /// Place one limit buy order.
    PlaceOrder(PlaceOrderArgs),
    /// Show open positions.
    Positions,
    /// Show balance and portfolio value.
    Balance,
    /// Write the hourly, daily or weekly report.
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },
    /// Compare realized volatility to the model and propose, apply or revert new constants.
    Recalibrate(RecalibrateArgs),
    /// Replay settled trades under one parameter set.
    Backtest(BacktestArgs),
    /// Replay settled trades over the full parameter grid.
    Sweep {
        /// Days of trade history to replay.
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Query every price source and report the consensus and spread per asset.
    SpreadCheck,
    /// Probe every price source once and summarise the reliability log.
    Probe,
    /// Refresh candles and write realized volatility statistics.
    VolStats,
    /// Clear a tripped circuit breaker.
    ResetBreaker,
    /// Follow up pending orders and settle matured trades.
    Settle {
        /// Also cross-check settlement prices against an independent price history.
        #[arg(long)]
        validate: bool,
    },
    /// Brier score, calibration curve, regime and side statistics of settled trades.
    Calibration,
    /// Compare the latest latency profile to its history.
    LatencyCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SideArg {
    Yes,
    No,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Yes => Side::Yes,
            SideArg::No => Side::No,
        }
    }
}

#[derive(Debug, Args)]
pub struct PlaceOrderArgs {
    pub ticker: String,
    #[arg(value_enum)]
    pub side: SideArg,
    /// Contracts to buy.
    pub count: u32,
    /// Limit price in cents (1-99).
    pub price_cents: u32,
}

#[derive(Debug, Subcommand)]
pub enum ReportKind {
    Hourly,
    Daily {
        /// Report date (default: yesterday, UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Weekly {
        /// Last day of the week reported (default: yesterday, UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, Args)]
pub struct RecalibrateArgs {
    /// Write the proposed constants to the volatility model.
    #[arg(long, conflicts_with_all = ["revert", "status"])]
    pub apply: bool,
    /// Restore the model saved by the last apply.
    #[arg(long, conflicts_with = "status")]
    pub revert: bool,
    /// Show the current model, backup and last history entry.
    #[arg(long)]
    pub status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    Current,
    Realized,
    Aggressive,
    Conservative,
}

impl From<ScenarioArg> for VolScenario {
    fn from(scenario: ScenarioArg) -> Self {
        match scenario {
            ScenarioArg::Current => VolScenario::Current,
            ScenarioArg::Realized => VolScenario::Realized,
            ScenarioArg::Aggressive => VolScenario::Aggressive,
            ScenarioArg::Conservative => VolScenario::Conservative,
        }
    }
}

#[derive(Debug, Args)]
pub struct BacktestArgs {
    /// Flat edge gate; defaults to each trade's recorded dynamic minimum.
    #[arg(long)]
    pub min_edge: Option<f64>,
    /// Kelly fraction; defaults to the configured base Kelly.
    #[arg(long)]
    pub kelly: Option<f64>,
    #[arg(long, value_enum, default_value = "current")]
    pub scenario: ScenarioArg,
    /// Days of trade history to replay.
    #[arg(long, default_value_t = 30)]
    pub days: i64,
}
