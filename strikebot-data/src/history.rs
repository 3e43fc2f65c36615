use crate::{candle::binance::parse_kline, error::DataError, http};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::time::Duration;
use strikebot_instrument::Asset;

/// Capability of a source able to answer "what was the price of `asset` at `time`".
///
/// Used to cross-check venue settlement prices independently of the venue.
#[async_trait]
pub trait HistoricalPriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Close of the one-minute bar containing `time`, or `None` when no bar exists within
    /// `tolerance` of `time`.
    async fn price_at(
        &self,
        asset: Asset,
        time: DateTime<Utc>,
        tolerance: ChronoDuration,
    ) -> Result<Option<f64>, DataError>;
}

/// Binance one-minute klines.
#[derive(Debug, Clone)]
pub struct BinanceMinuteHistory {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BinanceMinuteHistory {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: "https://api.binance.com".to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl HistoricalPriceSource for BinanceMinuteHistory {
    fn name(&self) -> &str {
        "binance"
    }

    async fn price_at(
        &self,
        asset: Asset,
        time: DateTime<Utc>,
        tolerance: ChronoDuration,
    ) -> Result<Option<f64>, DataError> {
        let start = time - tolerance;
        let end = time + tolerance;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1m&startTime={}&endTime={}&limit=5",
            self.base_url,
            asset.binance_symbol(),
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        let rows: Vec<Vec<Value>> = http::get_json(&self.client, self.name(), &url, self.timeout).await?;
        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(candles
            .into_iter()
            .min_by_key(|candle| (candle.period_start - time).num_milliseconds().abs())
            .map(|candle| candle.close))
    }
}
