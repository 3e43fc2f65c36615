use super::CandleSource;
use crate::{error::DataError, http};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::time::Duration;
use strikebot_instrument::{Asset, Candle, CandleInterval};

const BASE_URL: &str = "https://api.binance.com";
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct BinanceKlines {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BinanceKlines {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }

    pub(crate) fn interval_code(interval: CandleInterval) -> &'static str {
        match interval {
            CandleInterval::Hour1 => "1h",
            CandleInterval::Hour4 => "4h",
        }
    }
}

/// Parse one kline row: `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
pub fn parse_kline(row: &[Value]) -> Result<Candle, DataError> {
    let field = |index: usize| -> Result<f64, DataError> {
        match row.get(index) {
            Some(Value::String(raw)) => raw
                .parse::<f64>()
                .map_err(|e| DataError::parse("binance", format!("kline field {index}: {e}"))),
            Some(Value::Number(number)) => number
                .as_f64()
                .ok_or_else(|| DataError::parse("binance", format!("kline field {index}"))),
            _ => Err(DataError::parse("binance", format!("kline field {index} missing"))),
        }
    };

    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| DataError::parse("binance", "kline open time missing"))?;
    let period_start = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| DataError::parse("binance", format!("invalid open time {open_time}")))?;

    Ok(Candle::new(
        period_start,
        field(1)?,
        field(2)?,
        field(3)?,
        field(4)?,
        field(5)?,
    ))
}

#[async_trait]
impl CandleSource for BinanceKlines {
    fn name(&self) -> &str {
        "binance"
    }

    async fn candles(
        &self,
        asset: Asset,
        interval: CandleInterval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        let url = url::Url::parse_with_params(
            &format!("{}/api/v3/klines", self.base_url),
            &[
                ("symbol", asset.binance_symbol().to_string()),
                ("interval", Self::interval_code(interval).to_string()),
                ("startTime", since.timestamp_millis().to_string()),
                ("limit", MAX_LIMIT.to_string()),
            ],
        )
        .map_err(|e| DataError::parse(self.name(), e))?;

        let rows: Vec<Vec<Value>> =
            http::get_json(&self.client, self.name(), url.as_str(), self.timeout).await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }
}
