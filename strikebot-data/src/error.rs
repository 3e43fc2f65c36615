use smol_str::SmolStr;
use strikebot_instrument::{Asset, CandleError, FailureKind};
use thiserror::Error;

/// All errors generated in `strikebot-data`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("{source_name}: request timed out")]
    Timeout { source_name: SmolStr },

    #[error("{source_name}: connection failed: {message}")]
    Connection {
        source_name: SmolStr,
        message: String,
    },

    #[error("{source_name}: HTTP status {status}")]
    Status { source_name: SmolStr, status: u16 },

    #[error("{source_name}: rate limited")]
    RateLimited { source_name: SmolStr },

    #[error("{source_name}: cooling down after rate limit")]
    CoolingDown { source_name: SmolStr },

    #[error("{source_name}: failed to parse response: {message}")]
    Parse {
        source_name: SmolStr,
        message: String,
    },

    #[error("no price sources available for {0}")]
    NoSourcesAvailable(Asset),

    #[error("invalid candle: {0}")]
    Candle(#[from] CandleError),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl DataError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DataError::Timeout { .. } | DataError::Connection { .. } => FailureKind::Transient,
            DataError::Status { status, .. } => match status {
                401 | 403 => FailureKind::Auth,
                429 => FailureKind::RateLimited,
                500..=599 => FailureKind::Transient,
                _ => FailureKind::Validation,
            },
            DataError::RateLimited { .. } | DataError::CoolingDown { .. } => {
                FailureKind::RateLimited
            }
            DataError::Parse { .. } | DataError::Candle(_) => FailureKind::Validation,
            DataError::NoSourcesAvailable(_) => FailureKind::Transient,
            DataError::Io { .. } => FailureKind::Io,
        }
    }

    /// Short failure attribution label used by telemetry and the reliability log
    /// (`timeout`, `connection`, `http_status`, `parse`, ...).
    pub fn attribution(&self) -> &'static str {
        match self {
            DataError::Timeout { .. } => "timeout",
            DataError::Connection { .. } => "connection",
            DataError::Status { .. } => "http_status",
            DataError::RateLimited { .. } => "rate_limited",
            DataError::CoolingDown { .. } => "cooling_down",
            DataError::Parse { .. } | DataError::Candle(_) => "parse",
            DataError::NoSourcesAvailable(_) => "no_sources_available",
            DataError::Io { .. } => "io",
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, error: impl std::fmt::Display) -> Self {
        DataError::Io {
            path: path.as_ref().display().to_string(),
            message: error.to_string(),
        }
    }

    pub fn parse(source_name: &str, error: impl std::fmt::Display) -> Self {
        DataError::Parse {
            source_name: SmolStr::new(source_name),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kind_mapping() {
        let status = |status| DataError::Status {
            source_name: SmolStr::new("binance"),
            status,
        };
        assert_eq!(status(503).kind(), FailureKind::Transient);
        assert_eq!(status(429).kind(), FailureKind::RateLimited);
        assert_eq!(status(401).kind(), FailureKind::Auth);
        assert_eq!(status(404).kind(), FailureKind::Validation);
        assert_eq!(status(503).attribution(), "http_status");
        assert_eq!(
            DataError::NoSourcesAvailable(Asset::Btc).attribution(),
            "no_sources_available"
        );
    }
}
