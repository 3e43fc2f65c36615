//! Kalshi venue for the strikebot trading core.
//!
//! Prices are integer cents (1-99) on the chosen side; the YES side is priced with `yes_price`
//! and the NO side with `no_price`.

pub mod http;
pub mod model;

use self::{
    http::KalshiHttpClient,
    model::{
        KalshiBalanceResponse, KalshiCreateOrder, KalshiMarketResponse, KalshiMarketsResponse,
        KalshiOrder, KalshiOrderResponse, KalshiPositionsResponse,
    },
};
use crate::{
    error::VenueError,
    venue::{Balance, OrderAck, OrderRequest, OrderStatus, Position, Venue},
};
use async_trait::async_trait;
use smol_str::SmolStr;
use strikebot_instrument::{Market, market::is_valid_price};
use tracing::{info, warn};

const MAX_PAGES: usize = 10;

/// Kalshi Trade API v2 implementation of [`Venue`].
#[derive(Debug, Clone)]
pub struct KalshiVenue {
    http: KalshiHttpClient,
}

impl KalshiVenue {
    pub fn new(http: KalshiHttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &KalshiHttpClient {
        &self.http
    }

    fn require_credentials(&self) -> Result<(), VenueError> {
        if self.http.has_credentials() {
            Ok(())
        } else {
            Err(VenueError::Credentials(
                "KALSHI_API_KEY and a private key are required for portfolio endpoints".into(),
            ))
        }
    }

    fn order_ack(order: KalshiOrder) -> OrderAck {
        OrderAck {
            order_id: SmolStr::new(&order.order_id),
            status: OrderStatus::parse(&order.status),
            fill_count: order.filled_count(),
            remaining_count: order.remaining_count.unwrap_or(0),
        }
    }

    fn client_order_id() -> String {
        use rand::Rng;
        format!(
            "sb-{}-{:08x}",
            chrono::Utc::now().timestamp_millis(),
            rand::rng().random::<u32>()
        )
    }
}

#[async_trait]
impl Venue for KalshiVenue {
    fn name(&self) -> &str {
        "kalshi"
    }

    async fn balance(&self) -> Result<Balance, VenueError> {
        self.require_credentials()?;
        let response: KalshiBalanceResponse = self.http.get("balance", "/portfolio/balance").await?;
        Ok(Balance {
            balance_cents: response.balance,
            portfolio_value_cents: response.portfolio_value.unwrap_or(response.balance),
        })
    }

    async fn positions(&self) -> Result<Vec<Position>, VenueError> {
        self.require_credentials()?;
        let mut positions = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let path = match &cursor {
                Some(cursor) => format!("/portfolio/positions?limit=200&cursor={cursor}"),
                None => "/portfolio/positions?limit=200".to_string(),
            };
            let page: KalshiPositionsResponse = self.http.get("positions", &path).await?;
            positions.extend(page.market_positions.into_iter().map(|p| Position {
                ticker: SmolStr::new(&p.ticker),
                contracts: p.position,
                exposure_cents: p.market_exposure,
                realized_pnl_cents: p.realized_pnl,
                resting_orders: p.resting_orders_count,
            }));
            match page.cursor.filter(|cursor| !cursor.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(positions)
    }

    async fn markets(&self, series: &str) -> Result<Vec<Market>, VenueError> {
        let path = format!("/markets?limit=200&status=open&series_ticker={series}");
        let response: KalshiMarketsResponse = self.http.get("markets_search", &path).await?;
        let total = response.markets.len();
        let markets = response
            .markets
            .iter()
            .filter_map(|market| {
                let parsed = market.to_market();
                if parsed.is_none() {
                    warn!(ticker = %market.ticker, "dropping market with unknown asset or strike");
                }
                parsed
            })
            .collect::<Vec<_>>();
        info!(%series, total, usable = markets.len(), "listed Kalshi markets");
        Ok(markets)
    }

    async fn market(&self, ticker: &str) -> Result<Market, VenueError> {
        let response: KalshiMarketResponse =
            self.http.get("market", &format!("/markets/{ticker}")).await?;
        response.market.to_market().ok_or_else(|| VenueError::Parse {
            endpoint: "market".to_string(),
            message: format!("{ticker}: unknown asset or strike"),
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.require_credentials()?;
        if !is_valid_price(order.price_cents) || order.count == 0 {
            return Err(VenueError::Rejected(format!(
                "invalid order {} x{} @ {}c",
                order.ticker, order.count, order.price_cents
            )));
        }

        let mut body =
            KalshiCreateOrder::buy_limit(&order.ticker, order.side, order.count, order.price_cents);
        body.client_order_id = Some(Self::client_order_id());

        let response: KalshiOrderResponse = self.http.post("order", "/portfolio/orders", &body).await?;
        let ack = Self::order_ack(response.order);
        info!(
            ticker = %order.ticker,
            side = %order.side,
            count = order.count,
            price_cents = order.price_cents,
            order_id = %ack.order_id,
            status = ?ack.status,
            fill_count = ack.fill_count,
            "Kalshi order placed"
        );
        Ok(ack)
    }

    async fn order(&self, order_id: &str) -> Result<OrderAck, VenueError> {
        self.require_credentials()?;
        let response: KalshiOrderResponse = self
            .http
            .get("order_status", &format!("/portfolio/orders/{order_id}"))
            .await?;
        Ok(Self::order_ack(response.order))
    }
}
