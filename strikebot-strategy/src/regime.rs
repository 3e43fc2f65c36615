use crate::config::RegimeThresholds;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strikebot_instrument::Candle;

/// Candles needed for the 24h change on a 4h series (`close_t` and `close_{t-6}`).
pub const MIN_REGIME_CANDLES: usize = 7;

/// Confidence given to the sideways label when no rule matched.
const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    #[display("trending_bullish")]
    TrendingBullish,
    #[display("trending_bearish")]
    TrendingBearish,
    #[display("sideways")]
    Sideways,
    #[display("choppy")]
    Choppy,
    #[display("unknown")]
    Unknown,
}

impl Regime {
    pub fn is_trending(&self) -> bool {
        matches!(self, Regime::TrendingBullish | Regime::TrendingBearish)
    }
}

/// Market regime derived from the latest 24h of 4h candles.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: f64,
    pub change_4h: f64,
    pub change_24h: f64,
    pub avg_range: f64,
}

impl RegimeState {
    pub fn unknown() -> Self {
        Self {
            regime: Regime::Unknown,
            confidence: 0.0,
            change_4h: 0.0,
            change_24h: 0.0,
            avg_range: 0.0,
        }
    }
}

/// Classify `candles` (4h, oldest first). Rules are evaluated top-down; the first match wins.
pub fn detect_regime(candles: &[Candle], thresholds: &RegimeThresholds) -> RegimeState {
    if candles.len() < MIN_REGIME_CANDLES {
        return RegimeState::unknown();
    }

    let last = candles.len() - 1;
    let close = candles[last].close;
    let close_4h = candles[last - 1].close;
    let close_24h = candles[last - 6].close;
    if close_4h <= 0.0 || close_24h <= 0.0 {
        return RegimeState::unknown();
    }

    let change_4h = (close - close_4h) / close_4h;
    let change_24h = (close - close_24h) / close_24h;
    let recent = &candles[last - 5..];
    let avg_range = recent.iter().map(Candle::range_pct).sum::<f64>() / recent.len() as f64;

    let (regime, confidence) = if change_24h > thresholds.trend_24h && change_4h > 0.0 {
        (
            Regime::TrendingBullish,
            strength(change_24h - thresholds.trend_24h, thresholds.trend_24h),
        )
    } else if change_24h < -thresholds.trend_24h && change_4h < 0.0 {
        (
            Regime::TrendingBearish,
            strength(-change_24h - thresholds.trend_24h, thresholds.trend_24h),
        )
    } else if avg_range > thresholds.choppy_range && change_4h.abs() < thresholds.choppy_4h {
        (
            Regime::Choppy,
            strength(avg_range - thresholds.choppy_range, thresholds.choppy_range),
        )
    } else if change_24h.abs() < thresholds.sideways_24h && change_4h.abs() < thresholds.sideways_4h
    {
        let margin = f64::min(
            (thresholds.sideways_24h - change_24h.abs()) / thresholds.sideways_24h,
            (thresholds.sideways_4h - change_4h.abs()) / thresholds.sideways_4h,
        );
        (Regime::Sideways, strength(margin, 1.0))
    } else {
        (Regime::Sideways, FALLBACK_CONFIDENCE)
    };

    RegimeState {
        regime,
        confidence,
        change_4h,
        change_24h,
        avg_range,
    }
}

/// Monotone map of how far the triggering inequality was exceeded onto `[0.5, 1.0]`.
fn strength(margin: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.5;
    }
    (0.5 + 0.5 * margin / scale).clamp(0.5, 1.0)
}
