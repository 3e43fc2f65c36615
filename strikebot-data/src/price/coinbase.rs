use super::{PriceSource, parse_price};
use crate::{error::DataError, http};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use strikebot_instrument::Asset;

const BASE_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Clone)]
pub struct CoinbaseSpot {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Response of `GET /v2/prices/{pair}/spot`.
#[derive(Debug, Deserialize)]
pub struct CoinbaseSpotResponse {
    pub data: CoinbaseSpotData,
}

#[derive(Debug, Deserialize)]
pub struct CoinbaseSpotData {
    pub amount: String,
    #[serde(default)]
    pub currency: String,
}

impl CoinbaseSpot {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PriceSource for CoinbaseSpot {
    fn name(&self) -> &str {
        "coinbase"
    }

    fn endpoint(&self, asset: Asset) -> String {
        format!("/v2/prices/{}/spot", asset.coinbase_pair())
    }

    async fn quote(&self, asset: Asset) -> Result<f64, DataError> {
        let url = format!("{}{}", self.base_url, self.endpoint(asset));
        let response: CoinbaseSpotResponse =
            http::get_json(&self.client, self.name(), &url, self.timeout).await?;
        parse_price(self.name(), &response.data.amount)
    }
}
