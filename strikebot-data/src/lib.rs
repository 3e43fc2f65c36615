#![forbid(unsafe_code)]

//! # Strikebot-Data
//! External market data and durable file stores for the strikebot trading core.
//!
//! * [`price`]: spot price sources (Binance, CoinGecko, Coinbase) behind the [`PriceSource`]
//!   capability, aggregated into a consensus [`SpotPrice`] by the [`PriceOracle`].
//! * [`candle`]: candle history sources and the file-backed [`OhlcCache`].
//! * [`history`]: point-in-time historical price lookup used to cross-check settlements.
//! * [`auth`]: Kalshi API credentials and request signing.
//! * [`store`]: JSONL append logs and atomic JSON file replacement.
//!
//! Every failure is a [`DataError`] carrying a [`FailureKind`](strikebot_instrument::FailureKind).

pub mod auth;
pub mod candle;
pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod price;
pub mod probe;
pub mod rate;
pub mod store;

pub use auth::{KalshiAuthError, KalshiAuthHeaders, KalshiCredentials};
pub use candle::{CandleSource, OhlcCache, cache::CandleWindow};
pub use config::{OhlcConfig, OracleConfig, PathsConfig};
pub use error::DataError;
pub use price::{PriceOracle, PriceSource, SpotPrice, oracle::SpreadAnomaly};
pub use rate::SourceCooldown;
