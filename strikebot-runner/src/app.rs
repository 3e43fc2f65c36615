//! Process wiring: configuration, venue, data sources and stores, built once per command.

use crate::error::RunnerError;
use std::{sync::Arc, time::Duration};
use strikebot_data::{
    CandleSource, KalshiCredentials, OhlcCache, PriceOracle, PriceSource, SourceCooldown,
    candle::{BinanceKlines, CoinGeckoOhlc},
    history::BinanceMinuteHistory,
    price::sources_from_names,
};
use strikebot_execution::{
    Telemetry, Venue,
    client::kalshi::{KalshiVenue, http::KalshiHttpClient},
    paper::PaperVenue,
};
use strikebot_strategy::{
    AlertBook, CircuitBreaker, Recalibrator, SettlementReconciler, StrikebotConfig, TradeJournal,
    TradingEngine,
};
use tracing::{info, warn};

/// Set to `1` or `true` to trade against the Kalshi demo environment.
pub const KALSHI_DEMO_ENV: &str = "KALSHI_DEMO";

#[derive(Debug, Clone)]
pub struct App {
    pub config: StrikebotConfig,
    pub dry_run: bool,
    pub telemetry: Telemetry,
}

impl App {
    pub fn new(mut config: StrikebotConfig, dry_run: bool) -> Self {
        if std::env::var(KALSHI_DEMO_ENV).is_ok_and(|value| matches!(value.as_str(), "1" | "true")) {
            config.execution.demo = true;
        }
        let telemetry = Telemetry::new(config.telemetry.clone());
        Self {
            config,
            dry_run,
            telemetry,
        }
    }

    /// Kalshi venue, wrapped in a paper venue for dry runs. Live trading requires credentials;
    /// dry runs fall back to the public market endpoints without them.
    pub fn venue(&self) -> Result<Arc<dyn Venue>, RunnerError> {
        let credentials = match KalshiCredentials::from_env() {
            Ok(credentials) => Some(credentials),
            Err(error) if self.dry_run => {
                warn!(%error, "no Kalshi credentials, dry run uses public market data only");
                None
            }
            Err(error) => return Err(error.into()),
        };
        let http = KalshiHttpClient::new(
            credentials,
            self.config.execution.clone(),
            self.telemetry.clone(),
        );
        let live: Arc<dyn Venue> = Arc::new(KalshiVenue::new(http));
        if self.dry_run {
            info!(bankroll_cents = self.config.execution.paper_bankroll_cents, "paper trading");
            Ok(Arc::new(PaperVenue::new(
                live,
                self.config.execution.paper_bankroll_cents,
            )))
        } else {
            Ok(live)
        }
    }

    pub fn price_sources(&self) -> Vec<Box<dyn PriceSource>> {
        sources_from_names(
            &self.config.oracle.sources,
            Duration::from_millis(self.config.oracle.timeout_ms),
        )
    }

    pub fn oracle(&self) -> PriceOracle {
        let paths = &self.config.paths;
        PriceOracle::new(
            self.price_sources(),
            self.config.oracle.clone(),
            SourceCooldown::new(Some(paths.rate_log())),
            Some(paths.spread_anomaly_log()),
        )
    }

    pub fn ohlc(&self) -> OhlcCache {
        let timeout = Duration::from_millis(self.config.ohlc.timeout_ms);
        let client = strikebot_data::http::client(timeout);
        let sources: Vec<Box<dyn CandleSource>> = vec![
            Box::new(BinanceKlines::new(client.clone(), timeout)),
            Box::new(CoinGeckoOhlc::new(client, timeout)),
        ];
        OhlcCache::new(self.config.paths.clone(), self.config.ohlc.clone(), sources)
    }

    pub fn history(&self) -> BinanceMinuteHistory {
        let timeout = Duration::from_millis(self.config.ohlc.timeout_ms);
        BinanceMinuteHistory::new(strikebot_data::http::client(timeout), timeout)
    }

    pub fn journal(&self) -> TradeJournal {
        TradeJournal::new(self.config.paths.clone(), self.dry_run)
    }

    pub fn alerts(&self) -> AlertBook {
        AlertBook::new(self.config.paths.clone(), self.config.alerts.clone())
    }

    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(self.config.paths.clone(), self.config.breaker.clone())
    }

    pub fn engine(&self) -> Result<TradingEngine, RunnerError> {
        Ok(TradingEngine::new(
            self.config.clone(),
            self.oracle(),
            self.ohlc(),
            self.venue()?,
            self.telemetry.clone(),
            self.journal(),
        ))
    }

    pub fn reconciler(&self) -> Result<SettlementReconciler, RunnerError> {
        Ok(SettlementReconciler::new(
            self.venue()?,
            self.journal(),
            self.alerts(),
            self.config.paths.clone(),
            self.config.calibration.clone(),
        ))
    }

    pub fn recalibrator(&self) -> Recalibrator {
        Recalibrator::new(
            self.config.paths.clone(),
            self.config.volatility.clone(),
            self.alerts(),
        )
    }
}
