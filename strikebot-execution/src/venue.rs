use crate::error::VenueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strikebot_instrument::{Market, Side, market::Cents};

/// Account cash and marked portfolio value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance_cents: Cents,
    pub portfolio_value_cents: Cents,
}

/// Open position in one market. Positive `contracts` are YES, negative are NO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: SmolStr,
    pub contracts: i64,
    pub exposure_cents: Cents,
    pub realized_pnl_cents: Cents,
    pub resting_orders: u32,
}

/// Buy limit order on one side of a binary market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub ticker: SmolStr,
    pub side: Side,
    pub count: u32,
    /// Limit price in cents on the chosen side (1..=99).
    pub price_cents: u32,
}

/// Venue order lifecycle as reported by the venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Resting,
    Executed,
    Canceled,
    Pending,
    Unknown,
}

impl OrderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "resting" => OrderStatus::Resting,
            "executed" | "filled" => OrderStatus::Executed,
            "canceled" | "cancelled" => OrderStatus::Canceled,
            "pending" => OrderStatus::Pending,
            _ => OrderStatus::Unknown,
        }
    }
}

/// Venue acknowledgement of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: SmolStr,
    pub status: OrderStatus,
    pub fill_count: u32,
    pub remaining_count: u32,
}

/// Capability interface to a prediction-market venue.
#[async_trait]
pub trait Venue: Send + Sync {
    fn name(&self) -> &str;

    async fn balance(&self) -> Result<Balance, VenueError>;

    async fn positions(&self) -> Result<Vec<Position>, VenueError>;

    /// Open markets of one series (eg/ `KXBTCD`).
    async fn markets(&self, series: &str) -> Result<Vec<Market>, VenueError>;

    /// Current state of one market, including its result once determined.
    async fn market(&self, ticker: &str) -> Result<Market, VenueError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError>;

    /// Current state of a previously placed order.
    async fn order(&self, order_id: &str) -> Result<OrderAck, VenueError>;
}
