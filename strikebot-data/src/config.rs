use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strikebot_instrument::{Asset, CandleInterval};

/// Durable file layout, anchored at a repository-relative data root.
///
/// Every store in strikebot resolves its file through this struct so the layout is defined once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of `ohlc/` and `trading/` (default `data`).
    pub data_root: PathBuf,
    /// Directory holding `*.alert` marker files (default `scripts`).
    pub alerts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            alerts_dir: PathBuf::from("scripts"),
        }
    }
}

impl PathsConfig {
    /// Layout rooted at `root` (`root/data`, `root/scripts`), used by tests and tools.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_root: root.join("data"),
            alerts_dir: root.join("scripts"),
        }
    }

    pub fn ohlc_dir(&self) -> PathBuf {
        self.data_root.join("ohlc")
    }

    pub fn trading_dir(&self) -> PathBuf {
        self.data_root.join("trading")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_root.join("reports")
    }

    pub fn ohlc_file(&self, asset: Asset, interval: CandleInterval) -> PathBuf {
        let name = match interval {
            CandleInterval::Hour4 => format!("{}-ohlc.json", asset.file_stem()),
            CandleInterval::Hour1 => format!("{}-ohlc-1h.json", asset.file_stem()),
        };
        self.ohlc_dir().join(name)
    }

    pub fn volatility_stats(&self) -> PathBuf {
        self.ohlc_dir().join("volatility-stats.json")
    }

    pub fn volatility_model(&self) -> PathBuf {
        self.trading_dir().join("volatility-model.json")
    }

    pub fn volatility_model_backup(&self) -> PathBuf {
        self.trading_dir().join("volatility-model.backup.json")
    }

    pub fn recalibration_history(&self) -> PathBuf {
        self.trading_dir()
            .join("volatility-recalibration-history.jsonl")
    }

    pub fn trades_log(&self, date: NaiveDate, dry_run: bool) -> PathBuf {
        let name = if dry_run {
            format!("kalshi-trades-dryrun-{}.jsonl", date.format("%Y-%m-%d"))
        } else {
            format!("kalshi-trades-{}.jsonl", date.format("%Y-%m-%d"))
        };
        self.trading_dir().join(name)
    }

    pub fn skips_log(&self, date: NaiveDate) -> PathBuf {
        self.trading_dir()
            .join(format!("kalshi-skips-{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn settlements(&self) -> PathBuf {
        self.trading_dir().join("kalshi-settlements-v2.json")
    }

    pub fn reliability_log(&self) -> PathBuf {
        self.trading_dir().join("api-reliability.jsonl")
    }

    pub fn rate_log(&self) -> PathBuf {
        self.trading_dir().join("kalshi-api-rate-log.jsonl")
    }

    pub fn spread_anomaly_log(&self) -> PathBuf {
        self.trading_dir().join("price-spread-anomalies.jsonl")
    }

    pub fn latency_profile(&self) -> PathBuf {
        self.trading_dir().join("kalshi-latency-profile.json")
    }

    pub fn latency_history(&self) -> PathBuf {
        self.trading_dir().join("latency-history.jsonl")
    }

    pub fn heartbeat(&self) -> PathBuf {
        self.trading_dir().join("autotrader-heartbeat.json")
    }

    pub fn breaker_state(&self) -> PathBuf {
        self.trading_dir().join("circuit-breaker-state.json")
    }

    pub fn calibration_analysis(&self) -> PathBuf {
        self.trading_dir().join("calibration-analysis.json")
    }

    pub fn settlement_validation(&self) -> PathBuf {
        self.trading_dir().join("settlement-validation.json")
    }

    pub fn sweep_results(&self) -> PathBuf {
        self.trading_dir().join("parameter-sweep.json")
    }

    pub fn alert_file(&self, tag: &str) -> PathBuf {
        self.alerts_dir.join(format!("kalshi-{tag}.alert"))
    }

    pub fn alert_ledger(&self) -> PathBuf {
        self.trading_dir().join("alert-ledger.json")
    }

    pub fn report_state(&self) -> PathBuf {
        self.reports_dir().join("hourly-report-state.json")
    }
}

/// Spot price consensus policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Budget for each source call, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum tolerated pairwise spread, as a fraction (0.01 = 1%).
    pub spread_threshold: f64,
    /// Enabled sources, in query order.
    pub sources: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            spread_threshold: 0.01,
            sources: vec![
                "binance".to_string(),
                "coingecko".to_string(),
                "coinbase".to_string(),
            ],
        }
    }
}

/// Candle history policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OhlcConfig {
    /// Depth of history kept usable, in days.
    pub lookback_days: i64,
    /// Series older than this many periods are reported stale.
    pub stale_after_periods: i64,
    pub timeout_ms: u64,
}

impl Default for OhlcConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            stale_after_periods: 2,
            timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let paths = PathsConfig::default();
        let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            paths.trades_log(date, false),
            PathBuf::from("data/trading/kalshi-trades-2025-01-31.jsonl")
        );
        assert_eq!(
            paths.trades_log(date, true),
            PathBuf::from("data/trading/kalshi-trades-dryrun-2025-01-31.jsonl")
        );
        assert_eq!(
            paths.ohlc_file(Asset::Btc, CandleInterval::Hour4),
            PathBuf::from("data/ohlc/btc-ohlc.json")
        );
        assert_eq!(
            paths.alert_file("circuit_breaker"),
            PathBuf::from("scripts/kalshi-circuit_breaker.alert")
        );
    }

    #[test]
    fn test_oracle_config_partial_json() {
        let config: OracleConfig = serde_json::from_str(r#"{"spread_threshold":0.02}"#).unwrap();
        assert_eq!(config.spread_threshold, 0.02);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.sources.len(), 3);
    }
}
