use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strikebot_instrument::{Asset, Candle, CandleInterval};

/// Binance klines candle source.
pub mod binance;

/// CoinGecko OHLC candle source (4h granularity only).
pub mod coingecko;

/// File-backed, append-only candle store.
pub mod cache;

pub use binance::BinanceKlines;
pub use cache::OhlcCache;
pub use coingecko::CoinGeckoOhlc;

/// Capability of an external candle history provider.
#[async_trait]
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Candles of `asset` at `interval` starting at or after `since`, oldest first. May include
    /// the still-forming current period; the cache discards it.
    async fn candles(
        &self,
        asset: Asset,
        interval: CandleInterval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError>;
}
