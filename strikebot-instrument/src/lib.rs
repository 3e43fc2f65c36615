#![forbid(unsafe_code)]

//! # Strikebot-Instrument
//! Core strikebot data structures shared by every other strikebot crate.
//!
//! * [`Asset`]: the process-wide set of tradeable underlyings.
//! * [`Side`]: the YES / NO side of a binary contract.
//! * [`Market`]: a venue-side "price above strike at expiry" binary contract.
//! * [`Candle`]: validated OHLCV bar with its [`CandleInterval`].
//! * [`FailureKind`]: the kind tag every strikebot error carries.

/// Tradeable underlying assets.
pub mod asset;

/// Binary contract side.
pub mod side;

/// Venue-side binary market and integer cents helpers.
pub mod market;

/// OHLCV candles and their validation rules.
pub mod candle;

/// Kind tag attached to every failure surfaced by strikebot components.
pub mod failure;

pub use asset::Asset;
pub use candle::{Candle, CandleError, CandleInterval, validate_series};
pub use failure::FailureKind;
pub use market::{Cents, Market, MarketStatus};
pub use side::Side;
