//! In-memory fakes of the data and venue capabilities. No network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{collections::HashMap, sync::Arc};
use strikebot_data::{
    CandleSource, CandleWindow, DataError, OhlcCache, PriceOracle, PriceSource, SourceCooldown,
};
use strikebot_execution::{
    Balance, OrderAck, OrderRequest, OrderStatus, Position, Telemetry, TelemetryConfig, Venue,
    VenueError,
};
use strikebot_instrument::{Asset, Candle, CandleInterval, Cents, Market, MarketStatus, Side};
use strikebot_strategy::{
    AlertBook, Regime, ResultStatus, SettlementReconciler, StrikebotConfig, TradeJournal,
    TradeRecord, TradingEngine,
};

/// Tick time used by every scenario, aligned to a 4h boundary.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 31, 16, 0, 0).unwrap()
}

pub fn config(root: &std::path::Path) -> StrikebotConfig {
    let mut config = StrikebotConfig::default();
    config.paths = strikebot_data::PathsConfig::rooted(root);
    config.strategy.assets = vec![Asset::Btc];
    config
}

pub struct FixedPrice {
    pub name: &'static str,
    pub price: f64,
}

#[async_trait]
impl PriceSource for FixedPrice {
    fn name(&self) -> &str {
        self.name
    }

    fn endpoint(&self, asset: Asset) -> String {
        format!("/{}/{asset}", self.name)
    }

    async fn quote(&self, _: Asset) -> Result<f64, DataError> {
        Ok(self.price)
    }
}

pub fn prices(values: [f64; 3]) -> Vec<Box<dyn PriceSource>> {
    ["binance", "coingecko", "coinbase"]
        .into_iter()
        .zip(values)
        .map(|(name, price)| Box::new(FixedPrice { name, price }) as Box<dyn PriceSource>)
        .collect()
}

/// Serves fixed 4h and 1h series.
pub struct FixedCandles {
    pub h4: Vec<Candle>,
    pub h1: Vec<Candle>,
}

#[async_trait]
impl CandleSource for FixedCandles {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn candles(
        &self,
        _: Asset,
        interval: CandleInterval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        let series = match interval {
            CandleInterval::Hour4 => &self.h4,
            CandleInterval::Hour1 => &self.h1,
        };
        Ok(series
            .iter()
            .filter(|candle| candle.period_start >= since)
            .cloned()
            .collect())
    }
}

/// `count` completed candles ending at `now()`, each close `growth` times the previous one.
pub fn series(interval: CandleInterval, count: usize, growth: f64) -> Vec<Candle> {
    let first = now() - interval.duration() * count as i32;
    let mut close = 100_000.0_f64 / growth.powi(count as i32);
    (0..count)
        .map(|index| {
            let open = close;
            close *= growth;
            let period_start = first + interval.duration() * index as i32;
            let (low, high) = (open.min(close) * 0.9975, open.max(close) * 1.0025);
            Candle::new(period_start, open, high, low, close, 10.0)
        })
        .collect()
}

pub fn flat_candles() -> FixedCandles {
    FixedCandles {
        h4: series(CandleInterval::Hour4, 42, 1.0),
        h1: series(CandleInterval::Hour1, 48, 1.0),
    }
}

pub fn rising_candles() -> FixedCandles {
    FixedCandles {
        h4: series(CandleInterval::Hour4, 42, 1.005),
        h1: series(CandleInterval::Hour1, 48, 1.002),
    }
}

/// Window whose close-to-close log returns alternate `+step, -step`.
pub fn zigzag_window(interval: CandleInterval, count: usize, step: f64) -> CandleWindow {
    let first = now() - interval.duration() * count as i32;
    let mut close = 100_000.0_f64;
    let candles = (0..count)
        .map(|index| {
            if index > 0 {
                let sign = if index % 2 == 1 { 1.0 } else { -1.0 };
                close *= (sign * step).exp();
            }
            Candle::new(first + interval.duration() * index as i32, close, close * 1.001, close * 0.999, close, 1.0)
        })
        .collect();
    CandleWindow {
        asset: Asset::Btc,
        interval,
        candles,
        stale: false,
    }
}

pub fn market(ticker: &str, strike: f64, yes_bid: u32, yes_ask: u32) -> Market {
    Market {
        ticker: SmolStr::new(ticker),
        asset: Asset::Btc,
        strike,
        close_time: now() + Duration::minutes(60),
        yes_bid,
        yes_ask,
        no_ask: None,
        volume: 1_000,
        open_interest: 500,
        status: MarketStatus::Open,
        result: None,
        expiration_value: None,
    }
}

/// Venue with a fixed market list that fills every order in full unless `place_error` is set.
pub struct FakeVenue {
    pub balance_cents: Cents,
    pub markets: Mutex<Vec<Market>>,
    pub orders: Mutex<Vec<OrderRequest>>,
    /// Order status reported by `order`, keyed by order id.
    pub acks: Mutex<HashMap<SmolStr, OrderAck>>,
    pub place_error: Mutex<Option<VenueError>>,
}

impl FakeVenue {
    pub fn new(balance_cents: Cents, markets: Vec<Market>) -> Arc<Self> {
        Arc::new(Self {
            balance_cents,
            markets: Mutex::new(markets),
            orders: Mutex::new(Vec::new()),
            acks: Mutex::new(HashMap::new()),
            place_error: Mutex::new(None),
        })
    }

    pub fn with_ack(self: Arc<Self>, ack: OrderAck) -> Arc<Self> {
        self.acks.lock().insert(ack.order_id.clone(), ack);
        self
    }

    pub fn failing_with(self: Arc<Self>, error: VenueError) -> Arc<Self> {
        *self.place_error.lock() = Some(error);
        self
    }
}

#[async_trait]
impl Venue for FakeVenue {
    fn name(&self) -> &str {
        "fake"
    }

    async fn balance(&self) -> Result<Balance, VenueError> {
        Ok(Balance {
            balance_cents: self.balance_cents,
            portfolio_value_cents: self.balance_cents,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>, VenueError> {
        Ok(Vec::new())
    }

    async fn markets(&self, series: &str) -> Result<Vec<Market>, VenueError> {
        Ok(self
            .markets
            .lock()
            .iter()
            .filter(|market| market.ticker.starts_with(series))
            .cloned()
            .collect())
    }

    async fn market(&self, ticker: &str) -> Result<Market, VenueError> {
        self.markets
            .lock()
            .iter()
            .find(|market| market.ticker == ticker)
            .cloned()
            .ok_or_else(|| VenueError::Rejected(format!("unknown market {ticker}")))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        let mut orders = self.orders.lock();
        orders.push(order.clone());
        if let Some(error) = self.place_error.lock().clone() {
            return Err(error);
        }
        Ok(OrderAck {
            order_id: SmolStr::new(format!("order-{}", orders.len())),
            status: OrderStatus::Executed,
            fill_count: order.count,
            remaining_count: 0,
        })
    }

    async fn order(&self, order_id: &str) -> Result<OrderAck, VenueError> {
        self.acks
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::Rejected(format!("unknown order {order_id}")))
    }
}

pub fn engine(
    config: &StrikebotConfig,
    prices: Vec<Box<dyn PriceSource>>,
    candles: FixedCandles,
    venue: Arc<dyn Venue>,
) -> TradingEngine {
    let oracle = PriceOracle::new(
        prices,
        config.oracle.clone(),
        SourceCooldown::new(None),
        Some(config.paths.spread_anomaly_log()),
    );
    let ohlc = OhlcCache::new(config.paths.clone(), config.ohlc.clone(), vec![Box::new(candles)]);
    TradingEngine::new(
        config.clone(),
        oracle,
        ohlc,
        venue,
        Telemetry::new(TelemetryConfig::default()),
        TradeJournal::new(config.paths.clone(), false),
    )
}

pub fn reconciler(config: &StrikebotConfig, venue: Arc<dyn Venue>) -> SettlementReconciler {
    SettlementReconciler::new(
        venue,
        TradeJournal::new(config.paths.clone(), false),
        AlertBook::new(config.paths.clone(), config.alerts.clone()),
        config.paths.clone(),
        config.calibration.clone(),
    )
}

/// Market of `trade` closed at its close time with the given settlement.
pub fn settled_market(trade: &TradeRecord, expiration_value: Option<f64>) -> Market {
    let mut settled = market(&trade.ticker, trade.strike, 0, 0);
    settled.close_time = trade.close_time;
    settled.status = MarketStatus::Settled;
    settled.expiration_value = expiration_value;
    settled
}

/// Acknowledgement of `order-{id}` with `fill` contracts filled.
pub fn ack(id: &str, status: OrderStatus, fill: u32, remaining: u32) -> OrderAck {
    OrderAck {
        order_id: SmolStr::new(format!("order-{id}")),
        status,
        fill_count: fill,
        remaining_count: remaining,
    }
}

/// Executed YES trade entered at `at` on a market closing an hour later.
pub fn executed_trade(id: &str, at: DateTime<Utc>, contracts: u32, price_cents: u32) -> TradeRecord {
    TradeRecord {
        id: SmolStr::new(id),
        timestamp: at,
        record_type: "trade".to_string(),
        ticker: SmolStr::new(format!("KXBTCD-{id}-T99000")),
        asset: Asset::Btc,
        side: Side::Yes,
        contracts,
        price_cents,
        cost_cents: Cents::from(contracts) * Cents::from(price_cents),
        edge: 0.25,
        our_prob: 0.95,
        market_prob: 0.70,
        strike: 99_000.0,
        current_price: 100_000.0,
        close_time: at + Duration::hours(1),
        minutes_to_expiry: 60.0,
        regime: Regime::TrendingBullish,
        regime_confidence: 0.75,
        dynamic_min_edge: 0.08,
        momentum_dir: 1.0,
        momentum_str: 0.4,
        full_alignment: true,
        vol_ratio: None,
        kelly_fraction_used: 0.055,
        size_multiplier_total: 1.1,
        result_status: ResultStatus::Executed,
        order_id: Some(SmolStr::new(format!("order-{id}"))),
        dry_run: false,
        error: None,
        settlement_price: None,
        profit_cents: None,
        settled_at: None,
    }
}
