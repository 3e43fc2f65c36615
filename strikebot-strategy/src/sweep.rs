//! Parameter sweep over the backtest grid, plus the skip reason histogram of the same period.

use crate::{
    backtest::{BacktestParams, BacktestResult, DEFAULT_BACKTEST_BANKROLL_CENTS, VolScenario, backtest},
    config::StrategyConfig,
    journal::{SkipRecord, TradeRecord},
    volatility::VolatilityModel,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strikebot_data::{DataError, PathsConfig, store};

pub const MIN_EDGE_GRID: [f64; 7] = [0.05, 0.08, 0.10, 0.12, 0.15, 0.18, 0.20];
pub const KELLY_GRID: [f64; 5] = [0.02, 0.03, 0.05, 0.08, 0.10];

/// Contents of `parameter-sweep.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SweepReport {
    pub timestamp: DateTime<Utc>,
    pub settled_trades: usize,
    /// Best first by PnL, then lower drawdown.
    pub results: Vec<BacktestResult>,
    pub skip_reasons: BTreeMap<String, usize>,
}

impl SweepReport {
    pub fn best(&self) -> Option<&BacktestResult> {
        self.results.first()
    }

    pub fn write(&self, paths: &PathsConfig) -> Result<(), DataError> {
        store::write_json_atomic(paths.sweep_results(), self)
    }
}

/// Every combination of the edge gate, Kelly fraction and volatility scenario grids.
pub fn parameter_grid() -> Vec<BacktestParams> {
    MIN_EDGE_GRID
        .iter()
        .cartesian_product(KELLY_GRID.iter())
        .cartesian_product(VolScenario::ALL.iter())
        .map(|((min_edge, kelly), scenario)| BacktestParams {
            min_edge: Some(*min_edge),
            kelly: *kelly,
            scenario: *scenario,
            starting_bankroll_cents: DEFAULT_BACKTEST_BANKROLL_CENTS,
        })
        .collect()
}

/// Skip counts keyed by the reason label.
pub fn skip_histogram(skips: &[SkipRecord]) -> BTreeMap<String, usize> {
    skips
        .iter()
        .map(|skip| skip.reason_key().to_string())
        .counts()
        .into_iter()
        .collect()
}

pub fn sweep(
    trades: &[TradeRecord],
    skips: &[SkipRecord],
    model: &VolatilityModel,
    config: &StrategyConfig,
    now: DateTime<Utc>,
) -> SweepReport {
    let results = parameter_grid()
        .iter()
        .map(|params| backtest(trades, model, params, config))
        .sorted_by(|a, b| {
            b.pnl_cents
                .cmp(&a.pnl_cents)
                .then(a.max_drawdown_cents.cmp(&b.max_drawdown_cents))
        })
        .collect::<Vec<_>>();

    SweepReport {
        timestamp: now,
        settled_trades: results.first().map_or(0, |result| result.considered),
        results,
        skip_reasons: skip_histogram(skips),
    }
}
