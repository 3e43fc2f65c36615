use strikebot_instrument::FailureKind;
use thiserror::Error;

/// Errors from venue operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("{endpoint}: request timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint}: connection error: {message}")]
    Connection { endpoint: String, message: String },

    #[error("{endpoint}: server error {status}: {body}")]
    Server {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: rate limited")]
    RateLimited { endpoint: String },

    #[error("{endpoint}: authentication rejected ({status})")]
    Auth { endpoint: String, status: u16 },

    #[error("{endpoint}: API error {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: parse error: {message}")]
    Parse { endpoint: String, message: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("order rejected: {0}")]
    Rejected(String),
}

impl VenueError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VenueError::Timeout { .. }
            | VenueError::Connection { .. }
            | VenueError::Server { .. } => FailureKind::Transient,
            VenueError::RateLimited { .. } => FailureKind::RateLimited,
            VenueError::Auth { .. } | VenueError::Credentials(_) => FailureKind::Auth,
            VenueError::Api { .. } | VenueError::Parse { .. } | VenueError::Rejected(_) => {
                FailureKind::Validation
            }
        }
    }

    /// Whether the executor retries the call.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// HTTP status, when the venue answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            VenueError::Server { status, .. }
            | VenueError::Auth { status, .. }
            | VenueError::Api { status, .. } => Some(*status),
            VenueError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
