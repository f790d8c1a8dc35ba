//! Result and error types for Covreplay.

use thiserror::Error;

/// Result type for Covreplay operations
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Errors that can occur while replaying coverage
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Coverage oracle could not produce a profile
    #[error("Coverage oracle failed for {package}-{test}: {message}")]
    Oracle {
        /// Package the test belongs to
        package: String,
        /// Test name
        test: String,
        /// Error message
        message: String,
    },

    /// Coverage profile text is malformed
    #[error("Malformed coverage profile at line {line}: {message}")]
    Profile {
        /// 1-based line of the profile text
        line: usize,
        /// Error message
        message: String,
    },

    /// Source file could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Source path
        path: String,
        /// Error message
        message: String,
    },

    /// Pruned tree could not be rendered back to text
    #[error("Failed to render {path}: {message}")]
    Render {
        /// Source path
        path: String,
        /// Error message
        message: String,
    },

    /// Source file could not be read
    #[error("Failed to read {path}: {message}")]
    Read {
        /// Source path
        path: String,
        /// Error message
        message: String,
    },

    /// A cache entry held a payload of an unexpected type
    #[error("Unexpected payload type in {cache} cache for key {key}")]
    CacheProtocol {
        /// Cache instance name
        cache: String,
        /// Offending key
        key: String,
    },

    /// The cache worker stopped before replying
    #[error("The {cache} cache worker is no longer running")]
    CacheClosed {
        /// Cache instance name
        cache: String,
    },

    /// Dead-code pruning hit the pass ceiling while still changing the tree
    #[error("Pruning {path} did not reach a fixpoint within {passes} passes")]
    PruneDiverged {
        /// Source path
        path: String,
        /// Passes attempted
        passes: usize,
    },

    /// A job worker panicked
    #[error("Job worker panicked: {message}")]
    WorkerPanicked {
        /// Panic payload, when it was a string
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ReplayError {
    /// Create an oracle error
    #[must_use]
    pub fn oracle(package: &str, test: &str, message: impl Into<String>) -> Self {
        Self::Oracle {
            package: package.to_string(),
            test: test.to_string(),
            message: message.into(),
        }
    }

    /// Create a profile format error
    #[must_use]
    pub fn profile(line: usize, message: impl Into<String>) -> Self {
        Self::Profile {
            line,
            message: message.into(),
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(path: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a render error
    #[must_use]
    pub fn render(path: &str, message: impl Into<String>) -> Self {
        Self::Render {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a read error
    #[must_use]
    pub fn read(path: &str, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error came from an external collaborator
    /// (oracle, parser, printer or file reader)
    #[must_use]
    pub const fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Self::Oracle { .. }
                | Self::Profile { .. }
                | Self::Parse { .. }
                | Self::Render { .. }
                | Self::Read { .. }
        )
    }
}
