//! Fractional Kelly position sizing.

use crate::{config::StrategyConfig, regime::Regime};
use serde::{Deserialize, Serialize};
use strikebot_instrument::{Cents, market::is_valid_price};

/// Inputs for sizing one order.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingInput {
    pub bankroll_cents: Cents,
    pub edge: f64,
    pub price_cents: u32,
    pub regime: Regime,
    pub assumed_hourly_vol: f64,
    pub realized_hourly_vol: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PositionSize {
    pub contracts: u32,
    pub cost_cents: Cents,
    /// Bet before flooring to whole contracts, after caps.
    pub bet_cents: Cents,
    pub cap_cents: Cents,
    pub kelly_fraction_used: f64,
    pub regime_multiplier: f64,
    pub vol_multiplier: f64,
    /// `realized / assumed` hourly volatility, when realized is known.
    pub vol_ratio: Option<f64>,
    pub size_multiplier_total: f64,
}

/// Reason an otherwise tradeable market cannot be sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingSkip {
    NoBankroll,
    NonPositiveEdge,
    /// Price outside 1..=99 cents.
    InvalidPrice,
    /// One contract costs more than the per-bet cap.
    PriceAboveCap,
}

impl SizingSkip {
    pub fn reason(&self) -> &'static str {
        match self {
            SizingSkip::NoBankroll => "no_bankroll",
            SizingSkip::NonPositiveEdge => "non_positive_edge",
            SizingSkip::InvalidPrice => "invalid_price",
            SizingSkip::PriceAboveCap => "price_above_cap",
        }
    }
}

/// `clamp(assumed / realized, min, max)`; 1.0 when realized is unknown.
pub fn vol_multiplier(assumed: f64, realized: Option<f64>, config: &StrategyConfig) -> f64 {
    match realized {
        Some(realized) if realized > 0.0 && assumed > 0.0 => {
            (assumed / realized).clamp(config.vol_multiplier_min, config.vol_multiplier_max)
        }
        _ => 1.0,
    }
}

/// Size a bet as `bankroll x kelly x edge`, capped at the bankroll fraction and absolute cap,
/// floored at the cost of one contract.
pub fn size_position(input: &SizingInput, config: &StrategyConfig) -> Result<PositionSize, SizingSkip> {
    if input.bankroll_cents <= 0 {
        return Err(SizingSkip::NoBankroll);
    }
    if input.edge.is_nan() || input.edge <= 0.0 {
        return Err(SizingSkip::NonPositiveEdge);
    }
    if !is_valid_price(input.price_cents) {
        return Err(SizingSkip::InvalidPrice);
    }

    let regime_multiplier = config.regime_multipliers.for_regime(input.regime);
    let vol_multiplier = vol_multiplier(
        input.assumed_hourly_vol,
        input.realized_hourly_vol,
        config,
    );
    let size_multiplier_total = regime_multiplier * vol_multiplier;
    let kelly_fraction_used = config.base_kelly * size_multiplier_total;

    let bankroll = input.bankroll_cents as f64;
    let cap_cents = ((bankroll * config.max_bet_fraction).floor() as Cents).min(config.max_bet_cents());
    let price = Cents::from(input.price_cents);
    if price > cap_cents {
        return Err(SizingSkip::PriceAboveCap);
    }

    let raw_bet = (bankroll * kelly_fraction_used * input.edge).max(0.0).floor() as Cents;
    let bet_cents = raw_bet.min(cap_cents).max(price);
    let contracts = (bet_cents / price).max(1);
    let contracts = u32::try_from(contracts).unwrap_or(u32::MAX);

    Ok(PositionSize {
        contracts,
        cost_cents: Cents::from(contracts) * price,
        bet_cents,
        cap_cents,
        kelly_fraction_used,
        regime_multiplier,
        vol_multiplier,
        vol_ratio: input
            .realized_hourly_vol
            .filter(|_| input.assumed_hourly_vol > 0.0)
            .map(|realized| realized / input.assumed_hourly_vol),
        size_multiplier_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(bankroll_cents: Cents, edge: f64, price_cents: u32) -> SizingInput {
        SizingInput {
            bankroll_cents,
            edge,
            price_cents,
            regime: Regime::TrendingBullish,
            assumed_hourly_vol: 0.005,
            realized_hourly_vol: None,
        }
    }

    #[test]
    fn test_kelly_bet() {
        // 100_000c x 0.055 x 0.2 = 1_100c -> 15 contracts at 70c
        let size = size_position(&input(100_000, 0.2, 70), &StrategyConfig::default()).unwrap();
        assert!((size.kelly_fraction_used - 0.055).abs() < 1e-12);
        assert_eq!(size.bet_cents, 1_100);
        assert_eq!(size.contracts, 15);
        assert_eq!(size.cost_cents, 1_050);
    }

    #[test]
    fn test_caps_and_floor() {
        let config = StrategyConfig::default();

        // Absolute cap of $25 binds on a large bankroll.
        let capped = size_position(&input(10_000_000, 0.5, 50), &config).unwrap();
        assert_eq!(capped.cap_cents, 2_500);
        assert!(capped.cost_cents <= 2_500);

        // 10% of bankroll binds on a small bankroll; tiny bets floor at one contract.
        let floored = size_position(&input(1_000, 0.01, 40), &config).unwrap();
        assert_eq!(floored.cap_cents, 100);
        assert_eq!(floored.contracts, 1);

        assert_eq!(size_position(&input(500, 0.3, 60), &config), Err(SizingSkip::PriceAboveCap));
        assert_eq!(size_position(&input(0, 0.3, 60), &config), Err(SizingSkip::NoBankroll));
        assert_eq!(size_position(&input(5_000, -0.1, 60), &config), Err(SizingSkip::NonPositiveEdge));
        assert_eq!(size_position(&input(5_000, 0.3, 0), &config), Err(SizingSkip::InvalidPrice));
        assert_eq!(size_position(&input(5_000, 0.3, 100), &config), Err(SizingSkip::InvalidPrice));
    }

    #[test]
    fn test_bet_never_exceeds_caps() {
        let mut config = StrategyConfig::default();
        config.max_bet_dollars = dec!(3);
        for bankroll in [1_000, 5_000, 50_000, 500_000] {
            for edge in [0.01, 0.1, 0.4, 0.9] {
                for price in [10, 35, 60, 90] {
                    if let Ok(size) = size_position(&input(bankroll, edge, price), &config) {
                        let cap = (bankroll / 10).min(300);
                        assert!(size.cost_cents <= cap, "{bankroll} {edge} {price}: {size:?}");
                        assert!(size.contracts >= 1);
                    }
                }
            }
        }
    }

    #[test]
    fn test_vol_multiplier_bounds() {
        let config = StrategyConfig::default();
        assert_eq!(vol_multiplier(0.005, None, &config), 1.0);
        assert_eq!(vol_multiplier(0.005, Some(0.02), &config), 0.5);
        assert_eq!(vol_multiplier(0.005, Some(0.001), &config), 1.5);
        assert!((vol_multiplier(0.005, Some(0.004), &config) - 1.25).abs() < 1e-12);
    }
}
