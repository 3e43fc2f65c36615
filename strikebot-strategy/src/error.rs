use serde::{Deserialize, Serialize};
use strikebot_data::DataError;
use strikebot_execution::VenueError;
use strikebot_instrument::FailureKind;
use thiserror::Error;

/// What the trading loop does with a failure of a given [`FailureKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Retry,
    SkipTick,
    SkipOpportunity,
    Halt,
}

impl Disposition {
    pub fn for_kind(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Transient => Disposition::Retry,
            FailureKind::RateLimited | FailureKind::Disagreement => Disposition::SkipTick,
            FailureKind::Validation
            | FailureKind::Degenerate
            | FailureKind::SettlementMismatch => Disposition::SkipOpportunity,
            FailureKind::Auth
            | FailureKind::CircuitBreaker
            | FailureKind::Config
            | FailureKind::Io => Disposition::Halt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Config
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JournalError {
    #[error("trade log io at {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid trade {id}: {reason}")]
    InvalidTrade { id: String, reason: String },

    #[error("trade {id}: illegal status transition {from} -> {to}")]
    IllegalTransition { id: String, from: String, to: String },
}

impl JournalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JournalError::Io { .. } => FailureKind::Io,
            JournalError::InvalidTrade { .. } | JournalError::IllegalTransition { .. } => {
                FailureKind::Validation
            }
        }
    }
}

impl From<DataError> for JournalError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::Io { path, message } => JournalError::Io { path, message },
            other => JournalError::Io {
                path: String::new(),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    #[error("alert io at {path}: {message}")]
    Io { path: String, message: String },
}

impl AlertError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Io
    }
}

impl From<DataError> for AlertError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::Io { path, message } => AlertError::Io { path, message },
            other => AlertError::Io {
                path: String::new(),
                message: other.to_string(),
            },
        }
    }
}

/// Failure surfaced by the trading engine and the batch jobs built on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("circuit breaker tripped: {0}")]
    BreakerTripped(String),

    #[error("settlement mismatch for {ticker}: {reason}")]
    SettlementMismatch { ticker: String, reason: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Data(error) => error.kind(),
            EngineError::Venue(error) => error.kind(),
            EngineError::Journal(error) => error.kind(),
            EngineError::Alert(error) => error.kind(),
            EngineError::Config(error) => error.kind(),
            EngineError::BreakerTripped(_) => FailureKind::CircuitBreaker,
            EngineError::SettlementMismatch { .. } => FailureKind::SettlementMismatch,
            EngineError::InsufficientData(_) => FailureKind::Validation,
        }
    }

    pub fn disposition(&self) -> Disposition {
        Disposition::for_kind(self.kind())
    }
}
