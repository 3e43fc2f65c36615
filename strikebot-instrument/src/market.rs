use crate::{asset::Asset, side::Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Signed money amount in US cents (costs, profits, balances).
pub type Cents = i64;

/// Lifecycle status of a venue market as seen by strikebot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Closed,
    Settled,
    Unknown,
}

impl MarketStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "open" | "active" | "initialized" => MarketStatus::Open,
            "closed" => MarketStatus::Closed,
            "settled" | "finalized" | "determined" => MarketStatus::Settled,
            _ => MarketStatus::Unknown,
        }
    }
}

/// Venue-side binary contract that pays 100 cents if the asset prints at or above `strike` at
/// `close_time`. Read-only for the trading core.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Market {
    pub ticker: SmolStr,
    pub asset: Asset,
    pub strike: f64,
    pub close_time: DateTime<Utc>,
    /// Best YES bid in cents (0 when the book is empty).
    pub yes_bid: u32,
    /// Best YES ask in cents (0 when the book is empty).
    pub yes_ask: u32,
    /// Best NO ask in cents, when the venue publishes one.
    pub no_ask: Option<u32>,
    pub volume: i64,
    pub open_interest: i64,
    pub status: MarketStatus,
    /// Venue-declared winning side once the market is determined.
    pub result: Option<Side>,
    /// Venue settlement value of the underlying, when published.
    pub expiration_value: Option<f64>,
}

impl Market {
    /// Market implied probability of YES (`yes_ask / 100`).
    pub fn implied_yes_probability(&self) -> f64 {
        f64::from(self.yes_ask) / 100.0
    }

    /// Price in cents for buying `side`. The NO side uses the venue `no_ask` when present and
    /// non-zero, otherwise the complement of the YES bid.
    pub fn ask_cents(&self, side: Side) -> u32 {
        match side {
            Side::Yes => self.yes_ask,
            Side::No => match self.no_ask {
                Some(no_ask) if no_ask > 0 => no_ask,
                _ => 100u32.saturating_sub(self.yes_bid),
            },
        }
    }

    pub fn hours_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        (self.close_time - now).num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn minutes_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        self.hours_to_expiry(now) * 60.0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.close_time <= now
    }
}

/// Returns true if `cents` is a valid binary contract price (`0 < cents < 100`).
pub fn is_valid_price(cents: u32) -> bool {
    (1..=99).contains(&cents)
}

/// Convert a dollar amount to whole cents, rounding to nearest.
pub fn dollars_to_cents(dollars: f64) -> Cents {
    (dollars * 100.0).round() as Cents
}

pub fn cents_to_dollars(cents: Cents) -> f64 {
    cents as f64 / 100.0
}
