use super::{ConsensusMethod, PriceSource, SpotPrice};
use crate::{config::OracleConfig, error::DataError, rate::SourceCooldown, store};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::BTreeMap,
    path::PathBuf,
    time::{Duration, Instant},
};
use strikebot_instrument::Asset;
use tracing::{debug, error, info, warn};

/// Result of querying one source during a consensus round.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: SmolStr,
    pub endpoint: String,
    pub latency_ms: f64,
    pub result: Result<f64, DataError>,
}

/// Sources disagreed beyond the configured spread threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadAnomaly {
    pub timestamp: DateTime<Utc>,
    pub asset: Asset,
    pub spread: f64,
    pub threshold: f64,
    pub sources: BTreeMap<SmolStr, f64>,
}

impl SpreadAnomaly {
    /// Alert tag for this anomaly (one tag per asset).
    pub fn alert_tag(&self) -> String {
        format!("price_spread_{}", self.asset.file_stem())
    }

    pub fn message(&self) -> String {
        let quotes = self
            .sources
            .iter()
            .map(|(source, price)| format!("{source}={price:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} price sources disagree: spread {:.2}% > {:.2}% ({quotes})",
            self.asset,
            self.spread * 100.0,
            self.threshold * 100.0
        )
    }
}

/// Output of one consensus round.
#[derive(Debug, Clone)]
pub struct OracleReading {
    pub price: SpotPrice,
    pub anomaly: Option<SpreadAnomaly>,
    pub outcomes: Vec<SourceOutcome>,
}

/// Aggregates spot prices for an asset across the configured [`PriceSource`]s.
pub struct PriceOracle {
    sources: Vec<Box<dyn PriceSource>>,
    config: OracleConfig,
    cooldown: SourceCooldown,
    anomaly_log: Option<PathBuf>,
    last: BTreeMap<Asset, SpotPrice>,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl PriceOracle {
    pub fn new(
        sources: Vec<Box<dyn PriceSource>>,
        config: OracleConfig,
        cooldown: SourceCooldown,
        anomaly_log: Option<PathBuf>,
    ) -> Self {
        Self {
            sources,
            config,
            cooldown,
            anomaly_log,
            last: BTreeMap::new(),
        }
    }

    /// Last consensus price produced for `asset`, if any.
    pub fn last(&self, asset: Asset) -> Option<&SpotPrice> {
        self.last.get(&asset)
    }

    /// Start of a trading tick: rate-limited sources become eligible again.
    pub fn begin_tick(&mut self) {
        self.cooldown.clear();
    }

    /// Query every eligible source within the timeout budget and derive the consensus price.
    ///
    /// Fails with [`DataError::NoSourcesAvailable`] when no source answers; the caller skips
    /// the tick.
    pub async fn consensus(&mut self, asset: Asset) -> Result<OracleReading, DataError> {
        let budget = Duration::from_millis(self.config.timeout_ms);

        let queries = self
            .sources
            .iter()
            .filter(|source| !self.cooldown.is_cooling(source.name()))
            .map(|source| async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(budget, source.quote(asset)).await {
                    Ok(result) => result,
                    Err(_) => Err(DataError::Timeout {
                        source_name: SmolStr::new(source.name()),
                    }),
                };
                SourceOutcome {
                    source: SmolStr::new(source.name()),
                    endpoint: source.endpoint(asset),
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    result,
                }
            });
        let outcomes = join_all(queries).await;

        let mut prices = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(price) => {
                    debug!(%asset, source = %outcome.source, price, latency_ms = outcome.latency_ms, "source quote");
                    prices.insert(outcome.source.clone(), *price);
                }
                Err(error) => {
                    warn!(%asset, source = %outcome.source, failure = error.attribution(), %error, "price source failed");
                    if matches!(error, DataError::RateLimited { .. }) {
                        self.cooldown.mark(&outcome.source, &outcome.endpoint);
                    }
                    failures.insert(outcome.source.clone(), error.attribution().to_string());
                }
            }
        }

        let values = prices.values().copied().collect::<Vec<_>>();
        let value = median(&values).ok_or(DataError::NoSourcesAvailable(asset))?;
        let method = if values.len() >= 2 {
            ConsensusMethod::Median
        } else {
            warn!(%asset, value, "only one price source answered, tick degraded");
            ConsensusMethod::SingleSource
        };
        let max_spread = max_pairwise_spread(&values);
        let now = Utc::now();

        let anomaly = (max_spread > self.config.spread_threshold).then(|| SpreadAnomaly {
            timestamp: now,
            asset,
            spread: max_spread,
            threshold: self.config.spread_threshold,
            sources: prices.clone(),
        });
        if let Some(anomaly) = &anomaly {
            self.record_anomaly(anomaly);
        }

        let price = SpotPrice {
            asset,
            timestamp: now,
            value,
            sources: prices,
            method,
            max_spread,
            failures,
        };
        info!(%asset, value, sources = price.sources.len(), max_spread, degraded = price.is_degraded(), "consensus price");
        self.last.insert(asset, price.clone());

        Ok(OracleReading {
            price,
            anomaly,
            outcomes,
        })
    }

    fn record_anomaly(&self, anomaly: &SpreadAnomaly) {
        warn!(asset = %anomaly.asset, spread = anomaly.spread, threshold = anomaly.threshold, "price spread anomaly");
        if let Some(path) = &self.anomaly_log {
            if let Err(e) = store::append_jsonl(path, anomaly) {
                error!(?path, %e, "failed to append spread anomaly");
            }
        }
    }
}

/// Median of `values`; the mean of the two middle values for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Maximum over pairs of `|p_i - p_j| / min(p_i, p_j)`, which is `(max - min) / min`.
pub fn max_pairwise_spread(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.len() < 2 || min <= 0.0 {
        0.0
    } else {
        (max - min) / min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedSource {
        name: &'static str,
        result: Result<f64, DataError>,
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn endpoint(&self, _: Asset) -> String {
            format!("/{}", self.name)
        }

        async fn quote(&self, _: Asset) -> Result<f64, DataError> {
            self.result.clone()
        }
    }

    fn oracle(sources: Vec<(&'static str, Result<f64, DataError>)>) -> PriceOracle {
        let sources = sources
            .into_iter()
            .map(|(name, result)| Box::new(FixedSource { name, result }) as Box<dyn PriceSource>)
            .collect();
        PriceOracle::new(sources, OracleConfig::default(), SourceCooldown::default(), None)
    }

    #[test]
    fn test_median_and_spread() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 4.0]), Some(2.5));
        assert!((max_pairwise_spread(&[100_000.0, 100_000.0, 101_500.0]) - 0.015).abs() < 1e-12);
        assert_eq!(max_pairwise_spread(&[100.0]), 0.0);
    }

    #[tokio::test]
    async fn test_consensus_median_of_three() {
        let mut oracle = oracle(vec![
            ("a", Ok(100_000.0)),
            ("b", Ok(100_200.0)),
            ("c", Ok(100_100.0)),
        ]);
        let reading = oracle.consensus(Asset::Btc).await.unwrap();
        assert_eq!(reading.price.value, 100_100.0);
        assert_eq!(reading.price.method, ConsensusMethod::Median);
        assert!(reading.anomaly.is_none());
        assert_eq!(oracle.last(Asset::Btc).map(|p| p.value), Some(100_100.0));
    }

    #[tokio::test]
    async fn test_single_source_is_degraded() {
        let mut oracle = oracle(vec![
            ("a", Ok(100_000.0)),
            ("b", Err(DataError::Timeout { source_name: SmolStr::new("b") })),
        ]);
        let reading = oracle.consensus(Asset::Btc).await.unwrap();
        assert!(reading.price.is_degraded());
        assert_eq!(reading.price.failures.get("b").map(String::as_str), Some("timeout"));
    }

    #[tokio::test]
    async fn test_no_sources_available() {
        let mut oracle = oracle(vec![(
            "a",
            Err(DataError::Status { source_name: SmolStr::new("a"), status: 503 }),
        )]);
        assert_eq!(
            oracle.consensus(Asset::Eth).await.unwrap_err(),
            DataError::NoSourcesAvailable(Asset::Eth)
        );
    }

    #[tokio::test]
    async fn test_rate_limited_source_skipped_until_next_tick() {
        let mut oracle = oracle(vec![
            ("a", Ok(100_000.0)),
            ("b", Err(DataError::RateLimited { source_name: SmolStr::new("b") })),
        ]);
        let first = oracle.consensus(Asset::Btc).await.unwrap();
        assert_eq!(first.outcomes.len(), 2);

        let second = oracle.consensus(Asset::Btc).await.unwrap();
        assert_eq!(second.outcomes.len(), 1);

        oracle.begin_tick();
        let third = oracle.consensus(Asset::Btc).await.unwrap();
        assert_eq!(third.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_spread_anomaly_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("anomalies.jsonl");
        let sources = vec![
            Box::new(FixedSource { name: "a", result: Ok(100_000.0) }) as Box<dyn PriceSource>,
            Box::new(FixedSource { name: "b", result: Ok(100_000.0) }),
            Box::new(FixedSource { name: "c", result: Ok(101_500.0) }),
        ];
        let mut oracle = PriceOracle::new(
            sources,
            OracleConfig::default(),
            SourceCooldown::default(),
            Some(log.clone()),
        );

        let reading = oracle.consensus(Asset::Btc).await.unwrap();
        let anomaly = reading.anomaly.unwrap();
        assert_eq!(anomaly.alert_tag(), "price_spread_btc");
        assert!((anomaly.spread - 0.015).abs() < 1e-12);

        let logged: Vec<SpreadAnomaly> = store::read_jsonl(&log).unwrap();
        assert_eq!(logged.len(), 1);
    }
}
