use super::PriceSource;
use crate::{error::DataError, http};
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use strikebot_instrument::Asset;

const BASE_URL: &str = "https://api.coingecko.com";

#[derive(Debug, Clone)]
pub struct CoinGeckoSimple {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Response of `GET /api/v3/simple/price`: `{ "bitcoin": { "usd": 100000.0 } }`.
pub type CoinGeckoSimplePrice = HashMap<String, HashMap<String, f64>>;

impl CoinGeckoSimple {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }
}

pub(crate) fn extract_usd(body: &CoinGeckoSimplePrice, asset: Asset) -> Result<f64, DataError> {
    body.get(asset.coingecko_id())
        .and_then(|quotes| quotes.get("usd"))
        .copied()
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| DataError::parse("coingecko", format!("missing usd price for {asset}")))
}

#[async_trait]
impl PriceSource for CoinGeckoSimple {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn endpoint(&self, asset: Asset) -> String {
        format!(
            "/api/v3/simple/price?ids={}&vs_currencies=usd",
            asset.coingecko_id()
        )
    }

    async fn quote(&self, asset: Asset) -> Result<f64, DataError> {
        let url = format!("{}{}", self.base_url, self.endpoint(asset));
        let body: CoinGeckoSimplePrice =
            http::get_json(&self.client, self.name(), &url, self.timeout).await?;
        extract_usd(&body, asset)
    }
}
