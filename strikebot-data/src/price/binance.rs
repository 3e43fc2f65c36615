use super::{PriceSource, parse_price};
use crate::{error::DataError, http};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use strikebot_instrument::Asset;

const BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone)]
pub struct BinanceSpot {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Response of `GET /api/v3/ticker/price?symbol=`.
#[derive(Debug, Deserialize)]
pub struct BinanceTicker {
    pub symbol: String,
    pub price: String,
}

impl BinanceSpot {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PriceSource for BinanceSpot {
    fn name(&self) -> &str {
        "binance"
    }

    fn endpoint(&self, asset: Asset) -> String {
        format!("/api/v3/ticker/price?symbol={}", asset.binance_symbol())
    }

    async fn quote(&self, asset: Asset) -> Result<f64, DataError> {
        let url = format!("{}{}", self.base_url, self.endpoint(asset));
        let ticker: BinanceTicker = http::get_json(&self.client, self.name(), &url, self.timeout).await?;
        parse_price(self.name(), &ticker.price)
    }
}
