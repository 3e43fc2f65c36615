use super::CandleSource;
use crate::{
    config::{OhlcConfig, PathsConfig},
    error::DataError,
    store,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strikebot_instrument::{Asset, Candle, CandleInterval};
use tracing::{debug, info, warn};

/// On-disk document: `{ asset, interval, candles: [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcFile {
    pub asset: Asset,
    pub interval: CandleInterval,
    pub candles: Vec<Candle>,
}

/// Contiguous candle history served to the volatility, regime and momentum computations.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleWindow {
    pub asset: Asset,
    pub interval: CandleInterval,
    /// Longest contiguous suffix of the cached series, oldest first.
    pub candles: Vec<Candle>,
    /// True when the newest candle is older than the staleness budget, or the last refresh
    /// failed.
    pub stale: bool,
}

impl CandleWindow {
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|candle| candle.close).collect()
    }

    /// The most recent `count` candles (fewer if the window is shorter).
    pub fn tail(&self, count: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(count);
        &self.candles[start..]
    }
}

/// Outcome of one refresh call.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    /// Candles newly added to the store.
    pub added: usize,
    /// Fetched candles rejected by validation.
    pub rejected: usize,
    /// Source failure, if every source failed. The cached series stays usable.
    pub error: Option<DataError>,
}

/// Per-asset candle store keyed on `(asset, interval, period_start)`.
///
/// Single writer (the process refreshing it); readers re-validate contiguity on every load.
pub struct OhlcCache {
    paths: PathsConfig,
    config: OhlcConfig,
    sources: Vec<Box<dyn CandleSource>>,
}

impl std::fmt::Debug for OhlcCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OhlcCache")
            .field("paths", &self.paths)
            .field("config", &self.config)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl OhlcCache {
    pub fn new(paths: PathsConfig, config: OhlcConfig, sources: Vec<Box<dyn CandleSource>>) -> Self {
        Self {
            paths,
            config,
            sources,
        }
    }

    /// Load the stored series. Records failing validation are dropped.
    pub fn load(
        &self,
        asset: Asset,
        interval: CandleInterval,
    ) -> Result<BTreeMap<DateTime<Utc>, Candle>, DataError> {
        let path = self.paths.ohlc_file(asset, interval);
        let Some(file) = store::read_json::<OhlcFile>(&path)? else {
            return Ok(BTreeMap::new());
        };

        Ok(file
            .candles
            .into_iter()
            .filter(|candle| match candle.validate() {
                Ok(()) => true,
                Err(error) => {
                    warn!(?path, %error, "dropping invalid cached candle");
                    false
                }
            })
            .map(|candle| (candle.period_start, candle))
            .collect())
    }

    /// Fetch recent candles and merge them into the store. Periods already present are left
    /// untouched and the file is only rewritten when a new period arrives, so a refresh over a
    /// range already cached changes no bytes.
    pub async fn refresh(
        &self,
        asset: Asset,
        interval: CandleInterval,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, DataError> {
        let mut series = self.load(asset, interval)?;
        let since = series
            .keys()
            .next_back()
            .map(|last| *last + interval.duration())
            .unwrap_or(now - Duration::days(self.config.lookback_days));

        let mut last_error = None;
        let mut fetched = None;
        for source in &self.sources {
            match source.candles(asset, interval, since).await {
                Ok(candles) => {
                    debug!(%asset, ?interval, source = source.name(), count = candles.len(), "fetched candles");
                    fetched = Some(candles);
                    break;
                }
                Err(error) => {
                    warn!(%asset, ?interval, source = source.name(), failure = error.attribution(), %error, "candle source failed");
                    last_error = Some(error);
                }
            }
        }

        let Some(candles) = fetched else {
            return Ok(RefreshOutcome {
                added: 0,
                rejected: 0,
                error: last_error.or(Some(DataError::NoSourcesAvailable(asset))),
            });
        };

        let (added, rejected) = merge(&mut series, candles, interval, now);
        if added > 0 {
            self.write(asset, interval, &series)?;
            info!(%asset, ?interval, added, total = series.len(), "OHLC cache updated");
        }

        Ok(RefreshOutcome {
            added,
            rejected,
            error: None,
        })
    }

    /// Serve the longest contiguous suffix of the stored series with a staleness indicator.
    pub fn window(
        &self,
        asset: Asset,
        interval: CandleInterval,
        now: DateTime<Utc>,
    ) -> Result<CandleWindow, DataError> {
        let series = self.load(asset, interval)?;
        let candles = contiguous_suffix(series.into_values().collect(), interval);
        let stale = match candles.last() {
            Some(last) => {
                let budget = interval.duration() * (1 + self.config.stale_after_periods as i32);
                last.period_start + budget < now
            }
            None => true,
        };

        Ok(CandleWindow {
            asset,
            interval,
            candles,
            stale,
        })
    }

    /// Refresh, then serve the window. A failed refresh marks the window stale but still
    /// returns the cached series.
    pub async fn refreshed_window(
        &self,
        asset: Asset,
        interval: CandleInterval,
        now: DateTime<Utc>,
    ) -> Result<CandleWindow, DataError> {
        let outcome = self.refresh(asset, interval, now).await?;
        let mut window = self.window(asset, interval, now)?;
        if outcome.error.is_some() {
            window.stale = true;
        }
        Ok(window)
    }

    fn write(
        &self,
        asset: Asset,
        interval: CandleInterval,
        series: &BTreeMap<DateTime<Utc>, Candle>,
    ) -> Result<(), DataError> {
        let file = OhlcFile {
            asset,
            interval,
            candles: series.values().cloned().collect(),
        };
        store::write_json_atomic(self.paths.ohlc_file(asset, interval), &file)
    }
}

/// Insert completed, valid candles for periods not already present. Returns `(added, rejected)`.
pub fn merge(
    series: &mut BTreeMap<DateTime<Utc>, Candle>,
    fetched: Vec<Candle>,
    interval: CandleInterval,
    now: DateTime<Utc>,
) -> (usize, usize) {
    let mut added = 0;
    let mut rejected = 0;
    for candle in fetched {
        if candle.period_start + interval.duration() > now {
            continue;
        }
        if let Err(error) = candle.validate() {
            warn!(%error, "rejecting fetched candle");
            rejected += 1;
            continue;
        }
        if let std::collections::btree_map::Entry::Vacant(entry) = series.entry(candle.period_start) {
            entry.insert(candle);
            added += 1;
        }
    }
    (added, rejected)
}

/// Longest run of candles at the end of `candles` with no missing period.
pub fn contiguous_suffix(candles: Vec<Candle>, interval: CandleInterval) -> Vec<Candle> {
    let step = interval.duration();
    let start = candles
        .windows(2)
        .rposition(|pair| pair[1].period_start - pair[0].period_start != step)
        .map(|gap| gap + 1)
        .unwrap_or(0);
    candles[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Serves a fixed candle list, or fails.
    struct FakeCandles(Result<Vec<Candle>, DataError>);

    #[async_trait]
    impl CandleSource for FakeCandles {
        fn name(&self) -> &str {
            "fake"
        }

        async fn candles(
            &self,
            _: Asset,
            _: CandleInterval,
            _: DateTime<Utc>,
        ) -> Result<Vec<Candle>, DataError> {
            self.0.clone()
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn candle(period: i64, close: f64) -> Candle {
        Candle::new(base() + Duration::hours(4 * period), close, close + 1.0, close - 1.0, close, 1.0)
    }

    fn cache(dir: &std::path::Path, source: FakeCandles) -> OhlcCache {
        OhlcCache::new(
            PathsConfig::rooted(dir),
            OhlcConfig::default(),
            vec![Box::new(source)],
        )
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_over_cached_range() {
        let dir = tempfile::tempdir().unwrap();
        let candles = (0..6).map(|i| candle(i, 100.0 + i as f64)).collect::<Vec<_>>();
        let cache = cache(dir.path(), FakeCandles(Ok(candles)));
        let now = base() + Duration::hours(24);

        let first = cache.refresh(Asset::Btc, CandleInterval::Hour4, now).await.unwrap();
        assert_eq!(first.added, 6);
        let path = PathsConfig::rooted(dir.path()).ohlc_file(Asset::Btc, CandleInterval::Hour4);
        let before = std::fs::read(&path).unwrap();

        let second = cache.refresh(Asset::Btc, CandleInterval::Hour4, now).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_incomplete_and_invalid_candles_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = candle(1, 100.0);
        bad.high = 50.0;
        let candles = vec![candle(0, 100.0), bad, candle(2, 102.0)];
        let cache = cache(dir.path(), FakeCandles(Ok(candles)));

        // period 2 ends at +12h, which is after `now`
        let now = base() + Duration::hours(10);
        let outcome = cache.refresh(Asset::Eth, CandleInterval::Hour4, now).await.unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cache_and_marks_stale() {
        let dir = tempfile::tempdir().unwrap();
        let now = base() + Duration::hours(24);
        let seeded = cache(
            dir.path(),
            FakeCandles(Ok((0..6).map(|i| candle(i, 100.0)).collect())),
        );
        seeded.refresh(Asset::Btc, CandleInterval::Hour4, now).await.unwrap();

        let failing = cache(
            dir.path(),
            FakeCandles(Err(DataError::Timeout { source_name: "fake".into() })),
        );
        let window = failing
            .refreshed_window(Asset::Btc, CandleInterval::Hour4, now)
            .await
            .unwrap();
        assert_eq!(window.candles.len(), 6);
        assert!(window.stale);
    }

    #[test]
    fn test_contiguous_suffix_after_gap() {
        let candles = vec![candle(0, 1.0), candle(1, 1.0), candle(3, 1.0), candle(4, 1.0)];
        let suffix = contiguous_suffix(candles, CandleInterval::Hour4);
        assert_eq!(suffix.len(), 2);
        assert_eq!(suffix[0].period_start, base() + Duration::hours(12));
    }

    #[test]
    fn test_window_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), FakeCandles(Ok(vec![])));
        let mut series = BTreeMap::new();
        merge(
            &mut series,
            (0..6).map(|i| candle(i, 100.0)).collect(),
            CandleInterval::Hour4,
            base() + Duration::hours(24),
        );
        cache.write(Asset::Btc, CandleInterval::Hour4, &series).unwrap();

        let fresh = cache
            .window(Asset::Btc, CandleInterval::Hour4, base() + Duration::hours(25))
            .unwrap();
        assert!(!fresh.stale);
        let stale = cache
            .window(Asset::Btc, CandleInterval::Hour4, base() + Duration::hours(40))
            .unwrap();
        assert!(stale.stale);
        assert_eq!(stale.tail(2).len(), 2);
    }
}
