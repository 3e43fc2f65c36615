use crate::{
    error::VenueError,
    venue::{Balance, OrderAck, OrderRequest, OrderStatus, Position, Venue},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{collections::BTreeMap, sync::Arc};
use strikebot_instrument::{Market, Side, market::{Cents, is_valid_price}};
use tracing::info;

#[derive(Debug, Default)]
struct PaperBook {
    cash_cents: Cents,
    next_id: u64,
    orders: BTreeMap<SmolStr, OrderAck>,
    positions: BTreeMap<SmolStr, Position>,
}

/// Dry-run venue. Market reads go to the wrapped live venue; orders fill immediately and in
/// full at their limit price against a paper bankroll.
#[derive(Clone)]
pub struct PaperVenue {
    markets: Arc<dyn Venue>,
    book: Arc<Mutex<PaperBook>>,
}

impl std::fmt::Debug for PaperVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperVenue")
            .field("markets", &self.markets.name())
            .field("book", &self.book)
            .finish()
    }
}

impl PaperVenue {
    pub fn new(markets: Arc<dyn Venue>, bankroll_cents: Cents) -> Self {
        Self {
            markets,
            book: Arc::new(Mutex::new(PaperBook {
                cash_cents: bankroll_cents,
                ..PaperBook::default()
            })),
        }
    }
}

#[async_trait]
impl Venue for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn balance(&self) -> Result<Balance, VenueError> {
        let book = self.book.lock();
        let exposure: Cents = book.positions.values().map(|p| p.exposure_cents).sum();
        Ok(Balance {
            balance_cents: book.cash_cents,
            portfolio_value_cents: book.cash_cents + exposure,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>, VenueError> {
        Ok(self.book.lock().positions.values().cloned().collect())
    }

    async fn markets(&self, series: &str) -> Result<Vec<Market>, VenueError> {
        self.markets.markets(series).await
    }

    async fn market(&self, ticker: &str) -> Result<Market, VenueError> {
        self.markets.market(ticker).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        if !is_valid_price(order.price_cents) || order.count == 0 {
            return Err(VenueError::Rejected(format!(
                "invalid order {} x{} @ {}c",
                order.ticker, order.count, order.price_cents
            )));
        }
        let cost = Cents::from(order.count) * Cents::from(order.price_cents);

        let mut book = self.book.lock();
        if cost > book.cash_cents {
            return Err(VenueError::Rejected(format!(
                "insufficient paper balance: cost {cost}c > cash {}c",
                book.cash_cents
            )));
        }

        book.next_id += 1;
        let ack = OrderAck {
            order_id: SmolStr::new(format!("paper-{}", book.next_id)),
            status: OrderStatus::Executed,
            fill_count: order.count,
            remaining_count: 0,
        };
        book.cash_cents -= cost;

        let signed = match order.side {
            Side::Yes => i64::from(order.count),
            Side::No => -i64::from(order.count),
        };
        let position = book
            .positions
            .entry(order.ticker.clone())
            .or_insert_with(|| Position {
                ticker: order.ticker.clone(),
                contracts: 0,
                exposure_cents: 0,
                realized_pnl_cents: 0,
                resting_orders: 0,
            });
        position.contracts += signed;
        position.exposure_cents += cost;

        book.orders.insert(ack.order_id.clone(), ack.clone());
        info!(ticker = %order.ticker, side = %order.side, count = order.count, price_cents = order.price_cents, order_id = %ack.order_id, "paper order filled");
        Ok(ack)
    }

    async fn order(&self, order_id: &str) -> Result<OrderAck, VenueError> {
        self.book
            .lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::Api {
                endpoint: "order_status".to_string(),
                status: 404,
                body: format!("unknown paper order {order_id}"),
            })
    }
}
