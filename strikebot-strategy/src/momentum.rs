use crate::config::StrategyConfig;
use serde::{Deserialize, Serialize};
use strikebot_instrument::Side;

/// Lookback horizons in hours, paired positionally with the 1h/4h/24h weights.
pub const HORIZONS_HOURS: [usize; 3] = [1, 4, 24];

/// Multi-horizon momentum from hourly closes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MomentumState {
    /// Weighted sum of per-horizon signs, in `[-1, 1]`.
    pub direction: f64,
    /// Weighted, capped magnitude of the per-horizon log returns, in `[0, 1]`.
    pub strength: f64,
    /// Log return per horizon; `None` when the series is too short.
    pub returns: [Option<f64>; 3],
    /// Whether each horizon agrees with the composite direction.
    pub agree_1h: bool,
    pub agree_4h: bool,
    pub agree_24h: bool,
    /// All three horizons share the same non-zero sign.
    pub full_alignment: bool,
    /// At least two horizons share the same non-zero sign.
    pub aligned: bool,
}

impl MomentumState {
    pub fn neutral() -> Self {
        Self {
            direction: 0.0,
            strength: 0.0,
            returns: [None; 3],
            agree_1h: false,
            agree_4h: false,
            agree_24h: false,
            full_alignment: false,
            aligned: false,
        }
    }

    /// `Some(true)` when aligned momentum points toward `side` paying out, `Some(false)` when it
    /// points against it, `None` without alignment.
    pub fn supports(&self, side: Side) -> Option<bool> {
        if !self.aligned || self.direction == 0.0 {
            return None;
        }
        Some(match side {
            Side::Yes => self.direction > 0.0,
            Side::No => self.direction < 0.0,
        })
    }
}

/// Score hourly `closes` (oldest first).
pub fn score_momentum(closes: &[f64], config: &StrategyConfig) -> MomentumState {
    let weights = [
        config.momentum_weights.h1,
        config.momentum_weights.h4,
        config.momentum_weights.h24,
    ];
    let total_weight: f64 = weights.iter().sum();
    let Some(&latest) = closes.last().filter(|close| **close > 0.0) else {
        return MomentumState::neutral();
    };
    if total_weight <= 0.0 {
        return MomentumState::neutral();
    }

    let returns = HORIZONS_HOURS.map(|hours| {
        closes
            .len()
            .checked_sub(hours + 1)
            .map(|index| closes[index])
            .filter(|past| *past > 0.0)
            .map(|past| (latest / past).ln())
    });
    let signs = returns.map(|r| match r {
        Some(r) if r.abs() >= config.momentum_neutral_band => r.signum(),
        _ => 0.0,
    });

    let direction = weights
        .iter()
        .zip(signs)
        .map(|(weight, sign)| weight * sign)
        .sum::<f64>()
        / total_weight;
    let strength = weights
        .iter()
        .zip(returns)
        .map(|(weight, r)| {
            weight * r.map_or(0.0, |r| (r.abs() * config.momentum_strength_scale).min(1.0))
        })
        .sum::<f64>()
        / total_weight;

    let composite = if direction.abs() < f64::EPSILON {
        0.0
    } else {
        direction.signum()
    };
    let agrees = signs.map(|sign| composite != 0.0 && sign == composite);
    let ups = signs.iter().filter(|sign| **sign > 0.0).count();
    let downs = signs.iter().filter(|sign| **sign < 0.0).count();

    MomentumState {
        direction: direction.clamp(-1.0, 1.0),
        strength: strength.clamp(0.0, 1.0),
        returns,
        agree_1h: agrees[0],
        agree_4h: agrees[1],
        agree_24h: agrees[2],
        full_alignment: ups == 3 || downs == 3,
        aligned: ups >= 2 || downs >= 2,
    }
}
