//! Configuration records for the trading core, constructed once at process start.

use crate::{error::ConfigError, regime::Regime};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use strikebot_data::{OhlcConfig, OracleConfig, PathsConfig};
use strikebot_execution::{ExecutionConfig, TelemetryConfig};
use strikebot_instrument::Asset;

/// Default configuration file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "strikebot.json";

/// Complete strikebot configuration. Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrikebotConfig {
    pub paths: PathsConfig,
    pub oracle: OracleConfig,
    pub ohlc: OhlcConfig,
    pub volatility: VolatilityConfig,
    pub strategy: StrategyConfig,
    pub breaker: BreakerConfig,
    pub execution: ExecutionConfig,
    pub telemetry: TelemetryConfig,
    pub calibration: CalibrationConfig,
    pub alerts: AlertConfig,
    pub report: ReportConfig,
}

impl StrikebotConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, or use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.strategy.momentum_weights;
        if weights.h1 < 0.0 || weights.h4 < 0.0 || weights.h24 < 0.0 {
            return Err(ConfigError::Invalid("momentum weights must be non-negative".into()));
        }
        if !(0.0..=1.0).contains(&self.strategy.base_kelly) {
            return Err(ConfigError::Invalid("base_kelly must be within [0, 1]".into()));
        }
        if self.strategy.max_bet_dollars < Decimal::ZERO {
            return Err(ConfigError::Invalid("max_bet_dollars must be non-negative".into()));
        }
        if self
            .volatility
            .defaults
            .values()
            .any(|sigma| !sigma.is_finite() || *sigma <= 0.0)
        {
            return Err(ConfigError::Invalid("volatility defaults must be positive".into()));
        }
        Ok(())
    }
}

/// Assumed hourly volatility defaults and recalibration policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// Hourly sigma used when no volatility model file exists yet.
    pub defaults: BTreeMap<Asset, f64>,
    /// Days of 4h candles used for the realized sigma feeding the vol multiplier.
    pub realized_window_days: i64,
    /// Relative deviation required on both the 30d and 14d windows to propose a change.
    pub recalibration_threshold: f64,
    /// Buffer added on top of the realized 30d sigma when proposing.
    pub safety_buffer: f64,
    pub min_hourly: f64,
    pub max_hourly: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            defaults: BTreeMap::from([(Asset::Btc, 0.005), (Asset::Eth, 0.007)]),
            realized_window_days: 7,
            recalibration_threshold: 0.20,
            safety_buffer: 0.10,
            min_hourly: 0.002,
            max_hourly: 0.015,
        }
    }
}

/// Regime-conditional minimum edge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MinEdgeConfig {
    pub trending: f64,
    pub sideways: f64,
    pub choppy: f64,
    pub unknown: f64,
    /// Subtracted when momentum agrees with the chosen side, added when it opposes it.
    pub momentum_adjustment: f64,
}

impl Default for MinEdgeConfig {
    fn default() -> Self {
        Self {
            trending: 0.10,
            sideways: 0.15,
            choppy: 0.25,
            unknown: 0.20,
            momentum_adjustment: 0.02,
        }
    }
}

impl MinEdgeConfig {
    pub fn for_regime(&self, regime: Regime) -> f64 {
        match regime {
            Regime::TrendingBullish | Regime::TrendingBearish => self.trending,
            Regime::Sideways => self.sideways,
            Regime::Choppy => self.choppy,
            Regime::Unknown => self.unknown,
        }
    }
}

/// Kelly multipliers per regime.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegimeMultipliers {
    pub trending: f64,
    pub sideways: f64,
    pub choppy: f64,
    pub unknown: f64,
}

impl Default for RegimeMultipliers {
    fn default() -> Self {
        Self {
            trending: 1.1,
            sideways: 0.75,
            choppy: 0.5,
            unknown: 0.5,
        }
    }
}

impl RegimeMultipliers {
    pub fn for_regime(&self, regime: Regime) -> f64 {
        match regime {
            Regime::TrendingBullish | Regime::TrendingBearish => self.trending,
            Regime::Sideways => self.sideways,
            Regime::Choppy => self.choppy,
            Regime::Unknown => self.unknown,
        }
    }
}

/// Weights of the composite momentum signal per lookback horizon.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MomentumWeights {
    pub h1: f64,
    pub h4: f64,
    pub h24: f64,
}

impl Default for MomentumWeights {
    fn default() -> Self {
        Self {
            h1: 0.2,
            h4: 0.3,
            h24: 0.5,
        }
    }
}

/// Thresholds of the regime classification rules.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegimeThresholds {
    /// |24h change| above which a trend is declared.
    pub trend_24h: f64,
    /// Average candle range above which the market is choppy.
    pub choppy_range: f64,
    /// |4h change| below which a wide-range market is choppy.
    pub choppy_4h: f64,
    pub sideways_24h: f64,
    pub sideways_4h: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trend_24h: 0.02,
            choppy_range: 0.02,
            choppy_4h: 0.01,
            sideways_24h: 0.015,
            sideways_4h: 0.005,
        }
    }
}

/// Market selection, edge gate and sizing policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub assets: Vec<Asset>,
    pub tick_interval_secs: u64,
    pub base_kelly: f64,
    /// Maximum bet as a fraction of bankroll.
    pub max_bet_fraction: f64,
    /// Absolute maximum bet, in dollars.
    pub max_bet_dollars: Decimal,
    pub min_minutes_to_expiry: f64,
    /// Asks at or below this many cents are skipped.
    pub extreme_price_low: u32,
    /// Asks at or above this many cents are skipped.
    pub extreme_price_high: u32,
    pub max_open_positions: usize,
    /// Orders placed per tick, best candidates first.
    pub max_trades_per_tick: usize,
    pub min_edge: MinEdgeConfig,
    pub regime_multipliers: RegimeMultipliers,
    pub vol_multiplier_min: f64,
    pub vol_multiplier_max: f64,
    pub momentum_weights: MomentumWeights,
    /// |log return| below which a horizon counts as flat.
    pub momentum_neutral_band: f64,
    /// Scale applied to |log return| before capping the strength at 1.
    pub momentum_strength_scale: f64,
    pub regime: RegimeThresholds,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            assets: Asset::ALL.to_vec(),
            tick_interval_secs: 300,
            base_kelly: 0.05,
            max_bet_fraction: 0.10,
            max_bet_dollars: Decimal::new(25, 0),
            min_minutes_to_expiry: 45.0,
            extreme_price_low: 5,
            extreme_price_high: 95,
            max_open_positions: 30,
            max_trades_per_tick: 1,
            min_edge: MinEdgeConfig::default(),
            regime_multipliers: RegimeMultipliers::default(),
            vol_multiplier_min: 0.5,
            vol_multiplier_max: 1.5,
            momentum_weights: MomentumWeights::default(),
            momentum_neutral_band: 0.001,
            momentum_strength_scale: 20.0,
            regime: RegimeThresholds::default(),
        }
    }
}

impl StrategyConfig {
    pub fn max_bet_cents(&self) -> i64 {
        dollars_to_cents(self.max_bet_dollars)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub max_consecutive_losses: usize,
    /// Realised loss over the current UTC day that trips the breaker, in dollars.
    pub daily_loss_limit: Decimal,
    pub min_win_rate: f64,
    /// Settled trades considered by the win-rate rule.
    pub win_rate_window: usize,
    pub max_error_rate: f64,
    /// Hours after which a tripped breaker re-arms by itself.
    pub reset_after_hours: i64,
    /// Hard order failures in a row that trip the breaker.
    pub max_consecutive_errors: u32,
    /// Order attempts in the last hour before the persisted order error rate is assessed.
    pub min_orders_for_error_rate: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 5,
            daily_loss_limit: Decimal::new(5, 0),
            min_win_rate: 0.35,
            win_rate_window: 20,
            max_error_rate: 0.10,
            reset_after_hours: 4,
            max_consecutive_errors: 5,
            min_orders_for_error_rate: 10,
        }
    }
}

impl BreakerConfig {
    pub fn daily_loss_limit_cents(&self) -> i64 {
        dollars_to_cents(self.daily_loss_limit)
    }
}

/// Calibration analysis and settlement validation policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Equal-width probability buckets for ECE and the calibration curve.
    pub buckets: usize,
    /// Signed bucket gap beyond which a bucket counts as over/under confident.
    pub gap_tolerance: f64,
    /// Mean absolute settlement price error that raises an alert (0.005 = 0.5%).
    pub settlement_tolerance: f64,
    /// Window around expiry searched in the independent price source, in minutes.
    pub settlement_window_minutes: i64,
    /// Minimum validated settlements before the tolerance is judged.
    pub min_validation_samples: usize,
    /// Days of trade logs scanned by the reconciler and analyses.
    pub lookback_days: i64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            buckets: 5,
            gap_tolerance: 0.05,
            settlement_tolerance: 0.005,
            settlement_window_minutes: 1,
            min_validation_samples: 3,
            lookback_days: 30,
        }
    }
}

/// Per-tag alert cooldowns. Tags not listed match the longest listed prefix, else the default.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    pub default_cooldown_minutes: i64,
    pub cooldown_minutes: BTreeMap<String, i64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_cooldown_minutes: 60,
            cooldown_minutes: BTreeMap::from([
                ("price_spread".to_string(), 30),
                ("latency".to_string(), 120),
                ("circuit_breaker".to_string(), 240),
                ("daily_loss".to_string(), 240),
                ("win_rate".to_string(), 240),
                ("error_rate".to_string(), 60),
                ("auth_failure".to_string(), 60),
                ("settlement_mismatch".to_string(), 60),
                ("settlement_validation".to_string(), 360),
                ("recalibration".to_string(), 1440),
                ("calibration".to_string(), 1440),
            ]),
        }
    }
}

impl AlertConfig {
    pub fn cooldown_for(&self, tag: &str) -> chrono::Duration {
        let minutes = self
            .cooldown_minutes
            .get(tag)
            .copied()
            .or_else(|| {
                self.cooldown_minutes
                    .iter()
                    .filter(|(prefix, _)| tag.starts_with(prefix.as_str()))
                    .max_by_key(|(prefix, _)| prefix.len())
                    .map(|(_, minutes)| *minutes)
            })
            .unwrap_or(self.default_cooldown_minutes);
        chrono::Duration::minutes(minutes)
    }
}

/// Report fan-out policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// The trader counts as running if its heartbeat is younger than this.
    pub heartbeat_stale_minutes: i64,
    /// Skip the hourly report when nothing changed and there was no activity.
    pub suppress_idle_hourly: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            heartbeat_stale_minutes: 15,
            suppress_idle_hourly: true,
        }
    }
}

fn dollars_to_cents(dollars: Decimal) -> i64 {
    (dollars * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = StrikebotConfig::default();
        assert_eq!(config.strategy.base_kelly, 0.05);
        assert_eq!(config.strategy.max_bet_dollars, dec!(25));
        assert_eq!(config.strategy.max_bet_cents(), 2_500);
        assert_eq!(config.breaker.daily_loss_limit_cents(), 500);
        assert_eq!(config.volatility.defaults[&Asset::Btc], 0.005);
        assert_eq!(config.strategy.tick_interval_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_edge_by_regime() {
        let min_edge = MinEdgeConfig::default();
        assert_eq!(min_edge.for_regime(Regime::TrendingBearish), 0.10);
        assert_eq!(min_edge.for_regime(Regime::Sideways), 0.15);
        assert_eq!(min_edge.for_regime(Regime::Choppy), 0.25);
        assert_eq!(min_edge.for_regime(Regime::Unknown), 0.20);
    }

    #[test]
    fn test_alert_cooldown_prefix_lookup() {
        let alerts = AlertConfig::default();
        assert_eq!(alerts.cooldown_for("price_spread_btc"), chrono::Duration::minutes(30));
        assert_eq!(alerts.cooldown_for("latency_order"), chrono::Duration::hours(2));
        assert_eq!(alerts.cooldown_for("circuit_breaker"), chrono::Duration::hours(4));
        assert_eq!(alerts.cooldown_for("something_else"), chrono::Duration::hours(1));
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: StrikebotConfig = serde_json::from_str(
            r#"{"strategy":{"max_bet_dollars":10.5,"momentum_weights":{"h1":0.3,"h4":0.3,"h24":0.4}}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy.max_bet_dollars, dec!(10.5));
        assert_eq!(config.strategy.momentum_weights.h24, 0.4);
        assert_eq!(config.strategy.base_kelly, 0.05);
        assert_eq!(config.breaker, BreakerConfig::default());
    }

    #[test]
    fn test_invalid_volatility_rejected() {
        let mut config = StrikebotConfig::default();
        config.volatility.defaults.insert(Asset::Eth, 0.0);
        assert!(config.validate().is_err());
    }
}
