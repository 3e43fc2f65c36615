//! Kalshi API request/response models for Trade API v2.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strikebot_instrument::{Asset, Market, MarketStatus, Side};

/// Request body for POST /portfolio/orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KalshiCreateOrder {
    pub ticker: String,
    pub action: String, // "buy" or "sell"
    pub side: String,   // "yes" or "no"
    #[serde(rename = "type")]
    pub order_type: String, // "limit" or "market"
    pub count: u32,
    /// Price in cents (1-99)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl KalshiCreateOrder {
    /// Buy limit order priced on the chosen side.
    pub fn buy_limit(ticker: &str, side: Side, count: u32, price_cents: u32) -> Self {
        let (yes_price, no_price) = match side {
            Side::Yes => (Some(price_cents), None),
            Side::No => (None, Some(price_cents)),
        };
        Self {
            ticker: ticker.to_string(),
            action: "buy".to_string(),
            side: side.as_str().to_string(),
            order_type: "limit".to_string(),
            count,
            yes_price,
            no_price,
            client_order_id: None,
        }
    }
}

/// Response from POST /portfolio/orders and GET /portfolio/orders/{id}.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiOrderResponse {
    pub order: KalshiOrder,
}

/// A Kalshi order.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiOrder {
    pub order_id: String,
    #[serde(default)]
    pub ticker: String,
    pub status: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub yes_price: Option<u32>,
    #[serde(default)]
    pub no_price: Option<u32>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub fill_count: Option<u32>,
    #[serde(default)]
    pub remaining_count: Option<u32>,
}

impl KalshiOrder {
    /// Filled count: the explicit `fill_count` when present, else count - remaining.
    pub fn filled_count(&self) -> u32 {
        self.fill_count.unwrap_or_else(|| {
            let total = self.count.unwrap_or(0);
            let remaining = self.remaining_count.unwrap_or(0);
            total.saturating_sub(remaining)
        })
    }
}

/// Response from GET /portfolio/balance.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiBalanceResponse {
    pub balance: i64, // cents
    #[serde(default)]
    pub portfolio_value: Option<i64>,
}

/// Response from GET /portfolio/positions.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiPositionsResponse {
    #[serde(default)]
    pub market_positions: Vec<KalshiMarketPosition>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarketPosition {
    pub ticker: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub market_exposure: i64,
    #[serde(default)]
    pub realized_pnl: i64,
    #[serde(default)]
    pub resting_orders_count: u32,
}

/// Response from GET /markets.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarketsResponse {
    #[serde(default)]
    pub markets: Vec<KalshiMarket>,
    pub cursor: Option<String>,
}

/// Response from GET /markets/{ticker}.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarketResponse {
    pub market: KalshiMarket,
}

/// A Kalshi market as listed by the API. Only fields strikebot reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    pub ticker: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub yes_sub_title: Option<String>,
    #[serde(default)]
    pub floor_strike: Option<f64>,
    pub close_time: DateTime<Utc>,
    #[serde(default)]
    pub yes_bid: u32,
    #[serde(default)]
    pub yes_ask: u32,
    #[serde(default)]
    pub no_ask: Option<u32>,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub open_interest: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub expiration_value: Option<String>,
}

impl KalshiMarket {
    /// Strike from `floor_strike`, else the `$` figure in the subtitle, else the `-T` ticker suffix.
    pub fn strike(&self) -> Option<f64> {
        self.floor_strike
            .filter(|strike| *strike > 0.0)
            .or_else(|| {
                [&self.subtitle, &self.yes_sub_title]
                    .into_iter()
                    .flatten()
                    .find_map(|text| strike_from_subtitle(text))
            })
            .or_else(|| strike_from_ticker(&self.ticker))
    }

    /// Convert to the domain [`Market`]. Returns `None` if the asset or strike is unknown.
    pub fn to_market(&self) -> Option<Market> {
        let asset = Asset::from_ticker(&self.ticker)?;
        let strike = self.strike()?;
        let result = match self.result.as_deref() {
            Some("yes") => Some(Side::Yes),
            Some("no") => Some(Side::No),
            _ => None,
        };
        let expiration_value = self
            .expiration_value
            .as_deref()
            .and_then(|raw| raw.replace(',', "").parse::<f64>().ok());

        Some(Market {
            ticker: SmolStr::new(&self.ticker),
            asset,
            strike,
            close_time: self.close_time,
            yes_bid: self.yes_bid,
            yes_ask: self.yes_ask,
            no_ask: self.no_ask,
            volume: self.volume,
            open_interest: self.open_interest,
            status: MarketStatus::parse(&self.status),
            result,
            expiration_value,
        })
    }
}

/// Parse `"$99,999.99 or above"` style subtitles.
pub fn strike_from_subtitle(text: &str) -> Option<f64> {
    let after = text.split('$').nth(1)?;
    let digits: String = after
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

/// Parse the `-T<strike>` suffix of a ticker (eg/ `KXBTCD-25JAN3117-T99999.99`).
pub fn strike_from_ticker(ticker: &str) -> Option<f64> {
    let suffix = ticker.rsplit('-').next()?;
    suffix.strip_prefix('T')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_serialises_side_price_only() {
        let order = KalshiCreateOrder::buy_limit("KXBTCD-25JAN3117-T99999.99", Side::No, 3, 41);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["type"], "limit");
        assert_eq!(json["action"], "buy");
        assert_eq!(json["side"], "no");
        assert_eq!(json["no_price"], 41);
        assert!(json.get("yes_price").is_none());
    }

    #[test]
    fn test_strike_parsing() {
        assert_eq!(strike_from_subtitle("$99,999.99 or above"), Some(99_999.99));
        assert_eq!(strike_from_subtitle("no dollar"), None);
        assert_eq!(strike_from_ticker("KXBTCD-25JAN3117-T101249.99"), Some(101_249.99));
        assert_eq!(strike_from_ticker("KXBTCD-25JAN3117-B100000"), None);
    }

    #[test]
    fn test_de_market_to_domain() {
        let input = r#"{
            "ticker": "KXBTCD-25JAN3117-T99999.99",
            "subtitle": "$99,999.99 or above",
            "close_time": "2025-01-31T22:00:00Z",
            "yes_bid": 68,
            "yes_ask": 70,
            "no_ask": 32,
            "volume": 1200,
            "open_interest": 800,
            "status": "finalized",
            "result": "yes",
            "expiration_value": "100,512.33"
        }"#;
        let market: KalshiMarket = serde_json::from_str(input).unwrap();
        let market = market.to_market().unwrap();
        assert_eq!(market.asset, Asset::Btc);
        assert_eq!(market.strike, 99_999.99);
        assert_eq!(market.status, MarketStatus::Settled);
        assert_eq!(market.result, Some(Side::Yes));
        assert_eq!(market.expiration_value, Some(100_512.33));
        assert_eq!(market.no_ask, Some(32));
    }

    #[test]
    fn test_order_filled_count() {
        let input = r#"{"order_id":"abc","status":"resting","count":5,"remaining_count":2}"#;
        let order: KalshiOrder = serde_json::from_str(input).unwrap();
        assert_eq!(order.filled_count(), 3);
    }
}
