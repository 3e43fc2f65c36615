#![forbid(unsafe_code)]

//! # Strikebot-Strategy
//! Probability-model driven trading core for Kalshi "price above strike at expiry" crypto
//! markets, and the feedback loop that keeps the model honest.
//!
//! # Trading tick
//!
//! [`TradingEngine::tick`] runs one pass:
//!
//! ```text
//! breakers -> balance / positions -> per asset:
//!     consensus spot (oracle) -> 4h + 1h candles -> regime + momentum + sigma
//!     -> per market: filters -> P(S_T >= K) -> edge vs dynamic min edge
//! -> rank candidates -> Kelly size -> place order -> trade row
//! ```
//!
//! Every market that is not traded gets a [`SkipRecord`]; every order gets a [`TradeRecord`].
//! Failures carry a [`FailureKind`](strikebot_instrument::FailureKind) that
//! [`Disposition::for_kind`] maps to retry, skip-tick, skip-opportunity or halt.
//!
//! # Signal
//!
//! The probability of finishing at or above the strike is the lognormal driftless estimate
//!
//! ```text
//! d2 = ln(S/K) / (sigma * sqrt(T)) - sigma * sqrt(T) / 2
//! P  = clamp(N(d2), 0.01, 0.99)
//! ```
//!
//! with hourly sigma from the [`VolatilityModel`] and `T` in hours.
//!
//! # Batch jobs
//!
//! - [`SettlementReconciler`]: follows pending orders up and settles matured trades.
//! - [`settlement::validate_settlements`]: cross-checks settlement prices.
//! - [`calibration::analyse`]: Brier score, ECE, per-regime and per-side stats.
//! - [`Recalibrator`]: proposes, applies and reverts volatility constants.
//! - [`report`]: hourly status and daily / weekly summaries.
//! - [`backtest`] and [`sweep`]: replay settled trades under other parameters.

pub mod alert;
pub mod backtest;
pub mod breaker;
pub mod calibration;
pub mod config;
pub mod edge;
pub mod engine;
pub mod error;
pub mod journal;
pub mod latency;
pub mod momentum;
pub mod recalibration;
pub mod regime;
pub mod report;
pub mod settlement;
pub mod signal;
pub mod sizing;
pub mod sweep;
pub mod volatility;

// Re-exports for convenience
pub use alert::{AlertBook, AlertFile, AlertOutcome};
pub use breaker::{BreakerReason, BreakerStatus, CircuitBreaker};
pub use config::{StrikebotConfig, StrategyConfig};
pub use engine::{Heartbeat, TickHalt, TickReport, TradingEngine};
pub use error::{Disposition, EngineError};
pub use journal::{ResultStatus, SkipRecord, TradeJournal, TradeRecord};
pub use recalibration::{RecalibrationOutcome, Recalibrator};
pub use regime::Regime;
pub use settlement::SettlementReconciler;
pub use volatility::{VolatilityModel, VolatilityStats};
