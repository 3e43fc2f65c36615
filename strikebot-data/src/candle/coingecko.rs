use super::CandleSource;
use crate::{error::DataError, http};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;
use strikebot_instrument::{Asset, Candle, CandleInterval};

const BASE_URL: &str = "https://api.coingecko.com";

/// CoinGecko `/coins/{id}/ohlc`. Rows are `[close_time_ms, open, high, low, close]` with no
/// volume; 4h granularity is served for 3 to 30 day windows.
#[derive(Debug, Clone)]
pub struct CoinGeckoOhlc {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoOhlc {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }
}

pub fn parse_ohlc_rows(rows: &[[f64; 5]], interval: CandleInterval) -> Result<Vec<Candle>, DataError> {
    rows.iter()
        .map(|[time, open, high, low, close]| {
            let close_time = Utc
                .timestamp_millis_opt(*time as i64)
                .single()
                .ok_or_else(|| DataError::parse("coingecko", format!("invalid time {time}")))?;
            let period_start = interval.period_start(close_time - ChronoDuration::milliseconds(1));
            Ok(Candle::new(period_start, *open, *high, *low, *close, 0.0))
        })
        .collect()
}

#[async_trait]
impl CandleSource for CoinGeckoOhlc {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn candles(
        &self,
        asset: Asset,
        interval: CandleInterval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        if interval != CandleInterval::Hour4 {
            return Err(DataError::parse(self.name(), "only 4h candles are served"));
        }
        let days = (Utc::now() - since).num_days().clamp(3, 30);
        let url = format!(
            "{}/api/v3/coins/{}/ohlc?vs_currency=usd&days={days}",
            self.base_url,
            asset.coingecko_id()
        );
        let rows: Vec<[f64; 5]> = http::get_json(&self.client, self.name(), &url, self.timeout).await?;
        let candles = parse_ohlc_rows(&rows, interval)?;
        Ok(candles
            .into_iter()
            .filter(|candle| candle.period_start >= since)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ohlc_rows_maps_close_time_to_period_start() {
        // 2023-11-14T16:00:00Z close time
        let rows = [[1_699_977_600_000.0, 100.0, 110.0, 95.0, 105.0]];
        let candles = parse_ohlc_rows(&rows, CandleInterval::Hour4).unwrap();
        assert_eq!(
            candles[0].period_start.timestamp_millis(),
            1_699_977_600_000 - 4 * 3_600_000
        );
        assert_eq!(candles[0].volume, 0.0);
    }
}
