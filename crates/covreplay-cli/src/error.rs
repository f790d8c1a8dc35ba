//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Replay job ended in failure
    #[error("Replay job failed: {message}")]
    JobFailed {
        /// Error reported by the job
        message: String,
    },

    /// Snapshot output could not be written
    #[error("Snapshot output failed: {message}")]
    Output {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Covreplay library error
    #[error("Covreplay error: {0}")]
    Replay(#[from] covreplay::ReplayError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a job failure error
    #[must_use]
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed {
            message: message.into(),
        }
    }

    /// Create an output error
    #[must_use]
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad config");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("bad config"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad arg");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_job_failed_error() {
        let err = CliError::job_failed("oracle down");
        assert_eq!(err.to_string(), "Replay job failed: oracle down");
    }

    #[test]
    fn test_from_replay_error() {
        let err: CliError = covreplay::ReplayError::config("zero jobs").into();
        assert!(matches!(err, CliError::Replay(_)));
        assert!(err.to_string().contains("zero jobs"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CliError = io.into();
        assert!(err.to_string().contains("gone"));
    }
}
