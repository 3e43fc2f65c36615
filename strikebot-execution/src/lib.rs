#![forbid(unsafe_code)]

//! # Strikebot-Execution
//! Venue side of the strikebot trading core.
//!
//! * [`Venue`]: capability interface for balance, positions, market listing and order placement.
//! * [`client::kalshi::KalshiVenue`]: Kalshi Trade API v2 implementation with RSA-signed
//!   requests, bounded retry with exponential backoff and per-endpoint latency recording.
//! * [`paper::PaperVenue`]: dry-run venue that reads markets from a live venue and fills orders
//!   synthetically.
//! * [`telemetry::Telemetry`]: rolling per-endpoint latency profile, HTTP status class counters,
//!   skip reason counters and the latency anomaly detector.

pub mod client;
pub mod config;
pub mod error;
pub mod paper;
pub mod telemetry;
pub mod venue;

pub use config::{ExecutionConfig, TelemetryConfig};
pub use error::VenueError;
pub use telemetry::Telemetry;
pub use venue::{Balance, OrderAck, OrderRequest, OrderStatus, Position, Venue};
