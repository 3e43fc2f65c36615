//! Edge of our probability over the venue price, and the regime-conditional edge gate.

use crate::{config::StrategyConfig, momentum::MomentumState, regime::Regime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strikebot_instrument::{Market, Side};

/// Edge of the better side of one market.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EdgeAssessment {
    pub side: Side,
    /// Our probability that the YES outcome occurs.
    pub yes_probability: f64,
    /// Our probability that `side` pays out.
    pub our_prob: f64,
    /// Market implied probability of `side` (its ask / 100).
    pub market_prob: f64,
    pub price_cents: u32,
    /// `our_prob - market_prob`.
    pub edge: f64,
}

/// Evaluate both sides and keep the one with the larger edge. The edge may be negative.
///
/// Returns `None` when the market carries no YES quote.
pub fn assess_edge(market: &Market, yes_probability: f64) -> Option<EdgeAssessment> {
    if market.yes_ask == 0 {
        return None;
    }

    [Side::Yes, Side::No]
        .into_iter()
        .map(|side| {
            let price_cents = market.ask_cents(side);
            let our_prob = side.probability(yes_probability);
            let market_prob = f64::from(price_cents) / 100.0;
            EdgeAssessment {
                side,
                yes_probability,
                our_prob,
                market_prob,
                price_cents,
                edge: our_prob - market_prob,
            }
        })
        .max_by(|a, b| a.edge.partial_cmp(&b.edge).unwrap_or(Ordering::Equal))
}

/// Minimum edge for `regime`, lowered when aligned momentum supports `side` and raised when
/// it opposes it.
pub fn dynamic_min_edge(
    regime: Regime,
    momentum: &MomentumState,
    side: Side,
    config: &StrategyConfig,
) -> f64 {
    let base = config.min_edge.for_regime(regime);
    let adjustment = config.min_edge.momentum_adjustment;
    match momentum.supports(side) {
        Some(true) => base - adjustment,
        Some(false) => base + adjustment,
        None => base,
    }
}

/// Extreme or missing quote on the chosen side.
pub fn price_guard(price_cents: u32, config: &StrategyConfig) -> Option<&'static str> {
    if price_cents == 0 || price_cents >= 100 {
        Some("no_quote")
    } else if price_cents <= config.extreme_price_low || price_cents >= config.extreme_price_high {
        Some("extreme_price")
    } else {
        None
    }
}

/// Market that cleared every gate, waiting to be ranked and sized.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub market: Market,
    pub spot: f64,
    pub assessment: EdgeAssessment,
    pub dynamic_min_edge: f64,
    pub minutes_to_expiry: f64,
}

impl Candidate {
    pub fn strike_distance(&self) -> f64 {
        (self.market.strike - self.spot).abs()
    }
}

/// Best first: larger edge, then the strike closer to spot, then ticker order.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.assessment
            .edge
            .partial_cmp(&a.assessment.edge)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.strike_distance()
                    .partial_cmp(&b.strike_distance())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.market.ticker.cmp(&b.market.ticker))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};
    use smol_str::SmolStr;
    use strikebot_instrument::{Asset, Market, MarketStatus};

    pub fn market(strike: f64, yes_bid: u32, yes_ask: u32, now: DateTime<Utc>) -> Market {
        Market {
            ticker: SmolStr::new(format!("KXBTCD-25JAN3117-T{strike:.2}")),
            asset: Asset::Btc,
            strike,
            close_time: now + Duration::minutes(60),
            yes_bid,
            yes_ask,
            no_ask: None,
            volume: 1_000,
            open_interest: 500,
            status: MarketStatus::Open,
            result: None,
            expiration_value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::market, *};
    use crate::momentum::MomentumState;
    use chrono::Utc;

    #[test]
    fn test_yes_edge_selected() {
        let assessment = assess_edge(&market(99_000.0, 68, 70, Utc::now()), 0.9777).unwrap();
        assert_eq!(assessment.side, Side::Yes);
        assert_eq!(assessment.price_cents, 70);
        assert!((assessment.edge - 0.2777).abs() < 1e-9);
    }

    #[test]
    fn test_no_edge_uses_complement_of_bid() {
        let assessment = assess_edge(&market(101_000.0, 6, 8, Utc::now()), 0.0233).unwrap();
        assert_eq!(assessment.side, Side::No);
        assert_eq!(assessment.price_cents, 94);
        assert!((assessment.edge - (0.9767 - 0.94)).abs() < 1e-9);

        let mut with_no_ask = market(101_000.0, 6, 8, Utc::now());
        with_no_ask.no_ask = Some(93);
        assert_eq!(assess_edge(&with_no_ask, 0.0233).unwrap().price_cents, 93);
    }

    #[test]
    fn test_missing_quote() {
        assert_eq!(assess_edge(&market(99_000.0, 0, 0, Utc::now()), 0.5), None);
        let config = StrategyConfig::default();
        assert_eq!(price_guard(0, &config), Some("no_quote"));
        assert_eq!(price_guard(5, &config), Some("extreme_price"));
        assert_eq!(price_guard(95, &config), Some("extreme_price"));
        assert_eq!(price_guard(94, &config), None);
    }

    #[test]
    fn test_dynamic_min_edge_momentum_adjustment() {
        let config = StrategyConfig::default();
        let mut momentum = MomentumState::neutral();
        assert_eq!(dynamic_min_edge(Regime::Sideways, &momentum, Side::Yes, &config), 0.15);

        momentum.direction = 0.8;
        momentum.aligned = true;
        let aligned = dynamic_min_edge(Regime::Sideways, &momentum, Side::Yes, &config);
        let contrarian = dynamic_min_edge(Regime::Sideways, &momentum, Side::No, &config);
        assert!((aligned - 0.13).abs() < 1e-12);
        assert!((contrarian - 0.17).abs() < 1e-12);
    }

    #[test]
    fn test_ranking_tie_breaks_on_strike_distance() {
        let now = Utc::now();
        let candidate = |strike: f64, edge: f64| Candidate {
            market: market(strike, 40, 50, now),
            spot: 100_000.0,
            assessment: EdgeAssessment {
                side: Side::Yes,
                yes_probability: 0.5 + edge,
                our_prob: 0.5 + edge,
                market_prob: 0.5,
                price_cents: 50,
                edge,
            },
            dynamic_min_edge: 0.10,
            minutes_to_expiry: 60.0,
        };

        let mut candidates = vec![
            candidate(98_000.0, 0.20),
            candidate(101_000.0, 0.30),
            candidate(99_500.0, 0.20),
        ];
        rank_candidates(&mut candidates);
        let strikes = candidates.iter().map(|c| c.market.strike).collect::<Vec<_>>();
        assert_eq!(strikes, vec![101_000.0, 99_500.0, 98_000.0]);
    }
}
