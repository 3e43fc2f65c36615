use std::process::ExitCode;
use strikebot_data::{DataError, KalshiAuthError};
use strikebot_execution::VenueError;
use strikebot_instrument::FailureKind;
use strikebot_strategy::{
    EngineError,
    error::{AlertError, ConfigError, JournalError},
};
use thiserror::Error;

/// Exit code of a command that ran but found a condition needing attention.
pub const EXIT_BREACH: u8 = 1;
/// Exit code of a command that could not complete.
pub const EXIT_FAILURE: u8 = 2;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("kalshi credentials: {0}")]
    Credentials(#[from] KalshiAuthError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error("logging: {0}")]
    Logging(String),

    #[error("output: {0}")]
    Output(String),

    #[error("{0}")]
    Usage(String),
}

impl RunnerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunnerError::Config(error) => error.kind(),
            RunnerError::Credentials(error) => error.kind(),
            RunnerError::Engine(error) => error.kind(),
            RunnerError::Data(error) => error.kind(),
            RunnerError::Venue(error) => error.kind(),
            RunnerError::Journal(error) => error.kind(),
            RunnerError::Alert(error) => error.kind(),
            RunnerError::Logging(_) | RunnerError::Usage(_) => FailureKind::Config,
            RunnerError::Output(_) => FailureKind::Io,
        }
    }
}

/// Result of a command that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Nominal,
    /// A threshold was breached: breaker, spread, latency, calibration or validation.
    Breach,
}

impl Outcome {
    pub fn breach_if(breached: bool) -> Self {
        if breached { Outcome::Breach } else { Outcome::Nominal }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Nominal => ExitCode::SUCCESS,
            Outcome::Breach => ExitCode::from(EXIT_BREACH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_error_kind() {
        struct TestCase {
            error: RunnerError,
            expected: FailureKind,
        }

        let cases = vec![
            TestCase {
                error: RunnerError::Credentials(KalshiAuthError::KeyParse("bad pem".to_string())),
                expected: FailureKind::Auth,
            },
            TestCase {
                error: RunnerError::Credentials(KalshiAuthError::MissingEnv("KALSHI_API_KEY")),
                expected: FailureKind::Config,
            },
            TestCase {
                error: RunnerError::Config(ConfigError::Invalid("base_kelly".to_string())),
                expected: FailureKind::Config,
            },
            TestCase {
                error: RunnerError::Venue(VenueError::RateLimited {
                    endpoint: "/markets".to_string(),
                }),
                expected: FailureKind::RateLimited,
            },
            TestCase {
                error: RunnerError::Usage("--apply and --revert are exclusive".to_string()),
                expected: FailureKind::Config,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(test.error.kind(), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_breach_if() {
        assert_eq!(Outcome::breach_if(true), Outcome::Breach);
        assert_eq!(Outcome::breach_if(false), Outcome::Nominal);
    }
}
