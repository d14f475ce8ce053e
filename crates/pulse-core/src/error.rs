//! Error types for the Pulse metrics engine

use thiserror::Error;

/// Result type alias for Pulse operations
pub type PulseResult<T> = Result<T, PulseError>;

/// Main error type for the Pulse metrics engine
#[derive(Error, Debug, Clone)]
pub enum PulseError {
    /// A required metric value is missing from a request or batch
    #[error("incomplete request: {0}")]
    IncompleteRequest(String),

    /// A signature was expected but none was attached
    #[error("record is not signed")]
    NotSigned,

    /// The attached signature could not be decoded
    #[error("invalid signature format: {0}")]
    InvalidSignature(String),

    /// The metric kind is not one of the supported kinds
    #[error("metric kind not implemented: {kind}")]
    MetricNotImplemented { kind: String },

    /// No record stored under the requested key
    #[error("metric not found: {0}")]
    MetricNotFound(String),

    /// The selected storage backend does not support liveness checks
    #[error("health check is not supported by this storage backend")]
    HealthCheckNotSupported,

    /// A key file could not be read or parsed as PEM
    #[error("bad key file {path}: {message}")]
    BadKeyFile { path: String, message: String },

    /// The key file holds a valid PEM block of the wrong flavor
    #[error("unsupported key type in {path}")]
    NotSupportedKey { path: String },

    /// Storage layer errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Database backend errors
    #[error("database error: {0}")]
    Database(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(String),

    /// HTTP responses outside the 2xx range
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport failures before any HTTP status was received
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation exceeded its deadline
    #[error("operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The operation was cancelled by shutdown
    #[error("operation was cancelled")]
    Cancelled,

    /// Terminal exporter failure, wrapping the first error of a batch
    #[error("metrics export failed: {0}")]
    Export(Box<PulseError>),

    /// Catch-all for backend and runtime faults
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl PulseError {
    /// Create a new incomplete-request error
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::IncompleteRequest(message.into())
    }

    /// Create a new unknown-kind error
    pub fn not_implemented(kind: impl Into<String>) -> Self {
        Self::MetricNotImplemented { kind: kind.into() }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new timeout error
    pub const fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create a new catch-all error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Wrap the first recorded exporter error into its terminal form
    pub fn export(first: PulseError) -> Self {
        Self::Export(Box::new(first))
    }
}

impl From<std::io::Error> for PulseError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<rusqlite::Error> for PulseError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Database(error.to_string())
    }
}
