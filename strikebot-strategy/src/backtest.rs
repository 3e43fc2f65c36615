//! Replay of settled trades under alternative edge gates, Kelly fractions and volatility
//! assumptions.
//!
//! Every settled row carries its spot, strike, time to expiry and fill price, so the model can
//! be re-run on it. The realized outcome of the row's side is known; a replay only decides
//! whether the trade would have been taken and at what size.

use crate::{
    calibration::brier_score,
    config::StrategyConfig,
    journal::{ResultStatus, TradeRecord, settled_chronologically},
    signal::probability_above_strike,
    sizing::{SizingInput, size_position},
    volatility::VolatilityModel,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strikebot_instrument::Cents;

/// Starting bankroll of a replay when none is given: $100.
pub const DEFAULT_BACKTEST_BANKROLL_CENTS: Cents = 10_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolScenario {
    /// The model's current assumed sigma.
    #[display("current")]
    Current,
    /// The realized sigma recorded with each trade.
    #[display("realized")]
    Realized,
    /// Assumed sigma x 0.8.
    #[display("aggressive")]
    Aggressive,
    /// Assumed sigma x 1.25.
    #[display("conservative")]
    Conservative,
}

impl VolScenario {
    pub const ALL: [VolScenario; 4] = [
        VolScenario::Current,
        VolScenario::Realized,
        VolScenario::Aggressive,
        VolScenario::Conservative,
    ];

    /// Sigma to replay with. `vol_ratio` is the `realized / assumed` ratio stored on the row.
    pub fn sigma(&self, assumed: f64, vol_ratio: Option<f64>) -> f64 {
        match self {
            VolScenario::Current => assumed,
            VolScenario::Realized => vol_ratio
                .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
                .map_or(assumed, |ratio| assumed * ratio),
            VolScenario::Aggressive => assumed * 0.8,
            VolScenario::Conservative => assumed * 1.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestParams {
    /// Flat edge gate; `None` replays each row's recorded dynamic minimum.
    pub min_edge: Option<f64>,
    pub kelly: f64,
    pub scenario: VolScenario,
    pub starting_bankroll_cents: Cents,
}

impl BacktestParams {
    pub fn current(config: &StrategyConfig) -> Self {
        Self {
            min_edge: None,
            kelly: config.base_kelly,
            scenario: VolScenario::Current,
            starting_bankroll_cents: DEFAULT_BACKTEST_BANKROLL_CENTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestResult {
    pub params: BacktestParams,
    pub considered: usize,
    pub taken: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Option<f64>,
    pub pnl_cents: Cents,
    pub staked_cents: Cents,
    /// `pnl / staked`.
    pub roi: Option<f64>,
    pub final_bankroll_cents: Cents,
    pub max_drawdown_cents: Cents,
    /// Brier score of the replayed probabilities over taken trades.
    pub brier_score: Option<f64>,
    pub skipped: BTreeMap<String, usize>,
}

/// Replay the settled rows of `trades`, oldest settlement first.
pub fn backtest(
    trades: &[TradeRecord],
    model: &VolatilityModel,
    params: &BacktestParams,
    config: &StrategyConfig,
) -> BacktestResult {
    let config = StrategyConfig {
        base_kelly: params.kelly,
        ..config.clone()
    };

    let mut bankroll = params.starting_bankroll_cents;
    let mut peak = bankroll;
    let mut max_drawdown_cents = 0;
    let mut skipped = BTreeMap::<String, usize>::new();
    let mut pairs = Vec::new();
    let (mut taken, mut wins, mut losses, mut staked_cents) = (0, 0, 0, 0);

    let settled = settled_chronologically(trades);
    for trade in &settled {
        let assumed = model.assumed_hourly_vol(trade.asset);
        let sigma = params.scenario.sigma(assumed, trade.vol_ratio);
        let yes_probability = probability_above_strike(
            trade.current_price,
            trade.strike,
            trade.minutes_to_expiry / 60.0,
            sigma,
        );
        let our_prob = trade.side.probability(yes_probability);
        let edge = our_prob - f64::from(trade.price_cents) / 100.0;

        let min_edge = params.min_edge.unwrap_or(trade.dynamic_min_edge);
        if edge < min_edge {
            *skipped.entry("edge<min".to_string()).or_default() += 1;
            continue;
        }

        let size = match size_position(
            &SizingInput {
                bankroll_cents: bankroll,
                edge,
                price_cents: trade.price_cents,
                regime: trade.regime,
                assumed_hourly_vol: assumed,
                realized_hourly_vol: trade.vol_ratio.map(|ratio| ratio * assumed),
            },
            &config,
        ) {
            Ok(size) => size,
            Err(skip) => {
                *skipped.entry(skip.reason().to_string()).or_default() += 1;
                continue;
            }
        };

        let won = trade.result_status == ResultStatus::Won;
        let profit = if won {
            Cents::from(size.contracts) * (100 - Cents::from(trade.price_cents))
        } else {
            -size.cost_cents
        };
        taken += 1;
        if won {
            wins += 1;
        } else {
            losses += 1;
        }
        staked_cents += size.cost_cents;
        bankroll += profit;
        peak = peak.max(bankroll);
        max_drawdown_cents = max_drawdown_cents.max(peak - bankroll);
        pairs.push((our_prob, if won { 1.0 } else { 0.0 }));
    }

    let pnl_cents = bankroll - params.starting_bankroll_cents;
    BacktestResult {
        params: params.clone(),
        considered: settled.len(),
        taken,
        wins,
        losses,
        win_rate: (taken > 0).then(|| wins as f64 / taken as f64),
        pnl_cents,
        staked_cents,
        roi: (staked_cents > 0).then(|| pnl_cents as f64 / staked_cents as f64),
        final_bankroll_cents: bankroll,
        max_drawdown_cents,
        brier_score: brier_score(&pairs),
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::VolatilityConfig, journal::test_support::trade};
    use chrono::{Duration, TimeZone, Utc};
    use strikebot_instrument::Side;

    fn settled(index: i64, strike: f64, won: bool) -> TradeRecord {
        let at = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap() + Duration::hours(index);
        let mut row = trade(&format!("b{index}"), at, Side::Yes, 5, 70);
        row.strike = strike;
        row.dynamic_min_edge = 0.10;
        row.vol_ratio = None;
        row.result_status = if won { ResultStatus::Won } else { ResultStatus::Lost };
        row.profit_cents = Some(if won { 150 } else { -350 });
        row.settled_at = Some(at + Duration::hours(1));
        row
    }

    fn model() -> VolatilityModel {
        VolatilityModel::from_defaults(&VolatilityConfig::default())
    }

    #[test]
    fn test_scenario_sigma() {
        assert_eq!(VolScenario::Current.sigma(0.005, Some(2.0)), 0.005);
        assert_eq!(VolScenario::Realized.sigma(0.005, Some(2.0)), 0.01);
        assert_eq!(VolScenario::Realized.sigma(0.005, None), 0.005);
        assert!((VolScenario::Aggressive.sigma(0.005, None) - 0.004).abs() < 1e-12);
        assert!((VolScenario::Conservative.sigma(0.005, None) - 0.00625).abs() < 1e-12);
    }

    #[test]
    fn test_replay_takes_deep_in_the_money_trades() {
        // Spot 100_000 vs strike 99_000 with an hour left: p(yes) ~ 0.98, edge ~ 0.28.
        let trades = vec![settled(0, 99_000.0, true), settled(1, 99_000.0, false)];
        let config = StrategyConfig::default();
        let result = backtest(&trades, &model(), &BacktestParams::current(&config), &config);

        assert_eq!(result.considered, 2);
        assert_eq!(result.taken, 2);
        assert_eq!(result.wins, 1);
        assert_eq!(result.win_rate, Some(0.5));
        assert_eq!(result.final_bankroll_cents, result.params.starting_bankroll_cents + result.pnl_cents);
        assert!(result.max_drawdown_cents > 0);
    }

    #[test]
    fn test_flat_gate_filters() {
        // At the strike p(yes) ~ 0.5 against a 70c ask: negative edge.
        let trades = vec![settled(0, 100_000.0, true), settled(1, 99_000.0, true)];
        let config = StrategyConfig::default();
        let params = BacktestParams {
            min_edge: Some(0.05),
            ..BacktestParams::current(&config)
        };
        let result = backtest(&trades, &model(), &params, &config);

        assert_eq!(result.taken, 1);
        assert_eq!(result.skipped.get("edge<min"), Some(&1));
        assert!(result.pnl_cents > 0);
    }
}
