//! Error types.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type CheckResult<T> = Result<T, CheckError>;

/// Errors raised while setting up or performing a test request.
///
/// Everything except [`CheckError::Json`] is a setup failure: the test
/// environment is broken and there is nothing meaningful left to assert.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The ephemeral listener could not be bound.
    #[error("failed to bind ephemeral listener on {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The request URL could not be constructed.
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL that failed to parse.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name as supplied.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request body could not be serialized.
    #[error("failed to serialize request body: {0}")]
    Serialize(String),

    /// The HTTP client failed to complete the round trip.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    BodyRead(String),

    /// The buffered body is not valid JSON for the requested type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A runtime for the blocking API could not be created.
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The tracing subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl CheckError {
    /// Creates an [`CheckError::InvalidHeader`] error.
    pub fn invalid_header(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for setup failures, which abort the current test.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        !matches!(self, Self::Json(_))
    }
}
