//! Volatility model: the assumed hourly sigma per asset and realized sigma from the OHLC cache.
//!
//! The model file is read once per tick and only ever written by the recalibrator.

use crate::config::VolatilityConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use strikebot_data::{CandleWindow, DataError, PathsConfig, store};
use strikebot_instrument::{Asset, Candle, CandleInterval};
use tracing::{info, warn};

/// Lookback windows reported by the volatility statistics.
pub const STAT_PERIODS_DAYS: [i64; 3] = [7, 14, 30];

/// Persisted assumed hourly volatility, one constant per asset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolatilityModel {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub hourly: BTreeMap<Asset, f64>,
}

impl VolatilityModel {
    pub fn from_defaults(config: &VolatilityConfig) -> Self {
        Self {
            updated_at: None,
            hourly: config.defaults.clone(),
        }
    }

    /// Load the model file, falling back to configured defaults for a missing file or asset.
    pub fn load(paths: &PathsConfig, config: &VolatilityConfig) -> Result<Self, DataError> {
        let mut model = store::read_json::<Self>(paths.volatility_model())?
            .unwrap_or_else(|| Self::from_defaults(config));

        model.hourly.retain(|asset, sigma| {
            let usable = sigma.is_finite() && *sigma > 0.0;
            if !usable {
                warn!(%asset, sigma = *sigma, "ignoring non-positive volatility constant");
            }
            usable
        });
        for (asset, sigma) in &config.defaults {
            model.hourly.entry(*asset).or_insert(*sigma);
        }
        Ok(model)
    }

    pub fn save(&self, paths: &PathsConfig) -> Result<(), DataError> {
        store::write_json_atomic(paths.volatility_model(), self)?;
        info!(hourly = ?self.hourly, "volatility model written");
        Ok(())
    }

    /// Assumed standard deviation of the one-hour log return of `asset`.
    pub fn assumed_hourly_vol(&self, asset: Asset) -> f64 {
        self.hourly.get(&asset).copied().unwrap_or(0.0)
    }
}

/// Hourly sigma implied by the close-to-close log returns of `candles`.
///
/// Uses the population standard deviation scaled by `1/sqrt(interval hours)`. `None` when fewer
/// than two returns are available.
pub fn realized_hourly_vol(candles: &[Candle], interval: CandleInterval) -> Option<f64> {
    let returns = candles
        .windows(2)
        .filter(|pair| pair[0].close > 0.0 && pair[1].close > 0.0)
        .map(|pair| (pair[1].close / pair[0].close).ln())
        .collect::<Vec<_>>();
    if returns.len() < 2 {
        return None;
    }

    let sigma = returns.iter().population_std_dev() / (interval.hours() as f64).sqrt();
    sigma.is_finite().then_some(sigma)
}

/// Realized hourly sigma over the last `days` of a window.
pub fn realized_over_days(window: &CandleWindow, days: i64) -> Option<f64> {
    let candles = window.tail(window.interval.per_days(days) + 1);
    realized_hourly_vol(candles, window.interval)
}

/// Realized sigma of one lookback window compared to the model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolatilityPeriod {
    pub days: i64,
    pub samples: usize,
    pub realized_hourly: Option<f64>,
    pub assumed_hourly: f64,
    /// `(realized - assumed) / assumed`.
    pub deviation: Option<f64>,
}

impl VolatilityPeriod {
    pub fn compute(window: &CandleWindow, days: i64, assumed_hourly: f64) -> Self {
        let samples = window.tail(window.interval.per_days(days) + 1).len();
        let realized_hourly = realized_over_days(window, days);
        let deviation = realized_hourly
            .filter(|_| assumed_hourly > 0.0)
            .map(|realized| (realized - assumed_hourly) / assumed_hourly);
        Self {
            days,
            samples,
            realized_hourly,
            assumed_hourly,
            deviation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetVolatility {
    pub asset: Asset,
    pub stale: bool,
    pub periods: Vec<VolatilityPeriod>,
}

impl AssetVolatility {
    pub fn period(&self, days: i64) -> Option<&VolatilityPeriod> {
        self.periods.iter().find(|period| period.days == days)
    }
}

/// Document written to `data/ohlc/volatility-stats.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolatilityStats {
    pub timestamp: DateTime<Utc>,
    pub assets: Vec<AssetVolatility>,
}

impl VolatilityStats {
    pub fn compute(model: &VolatilityModel, windows: &[CandleWindow], now: DateTime<Utc>) -> Self {
        let assets = windows
            .iter()
            .map(|window| AssetVolatility {
                asset: window.asset,
                stale: window.stale,
                periods: STAT_PERIODS_DAYS
                    .iter()
                    .map(|days| {
                        VolatilityPeriod::compute(
                            window,
                            *days,
                            model.assumed_hourly_vol(window.asset),
                        )
                    })
                    .collect(),
            })
            .collect();

        Self {
            timestamp: now,
            assets,
        }
    }

    pub fn asset(&self, asset: Asset) -> Option<&AssetVolatility> {
        self.assets.iter().find(|stats| stats.asset == asset)
    }

    pub fn write(&self, paths: &PathsConfig) -> Result<(), DataError> {
        store::write_json_atomic(paths.volatility_stats(), self)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};
    use strikebot_data::CandleWindow;
    use strikebot_instrument::{Asset, Candle, CandleInterval};

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    /// Window whose close-to-close log returns alternate `+step, -step`.
    pub fn zigzag_window(asset: Asset, interval: CandleInterval, count: usize, step: f64) -> CandleWindow {
        let mut close = 100_000.0_f64;
        let candles = (0..count)
            .map(|index| {
                if index > 0 {
                    let sign = if index % 2 == 1 { 1.0 } else { -1.0 };
                    close *= (sign * step).exp();
                }
                let period_start = start() + interval.duration() * index as i32;
                Candle::new(period_start, close, close * 1.001, close * 0.999, close, 1.0)
            })
            .collect();
        CandleWindow {
            asset,
            interval,
            candles,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::zigzag_window, *};

    #[test]
    fn test_realized_vol_scales_to_hourly() {
        // 4h returns of +/-1.6% are 0.8% per hour.
        let window = zigzag_window(Asset::Btc, CandleInterval::Hour4, 181, 0.016);
        let realized = realized_over_days(&window, 30).unwrap();
        assert!((realized - 0.008).abs() < 1e-9, "{realized}");
    }

    #[test]
    fn test_realized_vol_needs_two_returns() {
        let window = zigzag_window(Asset::Eth, CandleInterval::Hour1, 2, 0.01);
        assert_eq!(realized_hourly_vol(&window.candles, window.interval), None);
    }

    #[test]
    fn test_model_defaults_and_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted(dir.path());
        let config = VolatilityConfig::default();

        let model = VolatilityModel::load(&paths, &config).unwrap();
        assert_eq!(model.assumed_hourly_vol(Asset::Btc), 0.005);

        let partial = VolatilityModel {
            updated_at: None,
            hourly: BTreeMap::from([(Asset::Btc, 0.0088)]),
        };
        partial.save(&paths).unwrap();
        let model = VolatilityModel::load(&paths, &config).unwrap();
        assert_eq!(model.assumed_hourly_vol(Asset::Btc), 0.0088);
        assert_eq!(model.assumed_hourly_vol(Asset::Eth), 0.007);
    }

    #[test]
    fn test_stats_deviation() {
        let model = VolatilityModel::from_defaults(&VolatilityConfig::default());
        let window = zigzag_window(Asset::Btc, CandleInterval::Hour4, 181, 0.016);
        let stats = VolatilityStats::compute(&model, &[window], test_support::start());

        let btc = stats.asset(Asset::Btc).unwrap();
        for days in STAT_PERIODS_DAYS {
            let deviation = btc.period(days).unwrap().deviation.unwrap();
            assert!((deviation - 0.6).abs() < 1e-6, "{days}d: {deviation}");
        }
    }
}
