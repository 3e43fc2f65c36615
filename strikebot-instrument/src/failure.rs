use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Kind tag carried by every failure a strikebot component returns.
///
/// Callers never inspect error messages; they dispatch on the kind (see the trading engine's
/// disposition matcher).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, connection reset, HTTP 5xx.
    Transient,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401/403 on a signed request, or unusable credentials.
    Auth,
    /// Malformed payload, bad candle, negative price, non-contiguous period.
    Validation,
    /// Price sources disagree beyond the spread threshold.
    Disagreement,
    /// Degenerate model input (clamped and carried on by the model itself).
    Degenerate,
    /// Winning side of a trade could not be determined.
    SettlementMismatch,
    /// A circuit breaker is tripped.
    CircuitBreaker,
    /// Invalid or missing configuration.
    Config,
    /// Local filesystem failure.
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Auth => "auth",
            FailureKind::Validation => "validation",
            FailureKind::Disagreement => "disagreement",
            FailureKind::Degenerate => "degenerate",
            FailureKind::SettlementMismatch => "settlement_mismatch",
            FailureKind::CircuitBreaker => "circuit_breaker",
            FailureKind::Config => "config",
            FailureKind::Io => "io",
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
