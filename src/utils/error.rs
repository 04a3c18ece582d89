use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatafluxError {
    #[error("Storage API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Storage API returned {status}: {message}")]
    StorageError { status: u16, message: String },

    #[error("Compose request rejected: {message}")]
    ComposeError { message: String },

    #[error("{operation} timed out after {seconds} seconds")]
    TimeoutError { operation: String, seconds: u64 },

    #[error("Expected {expected} objects, but got {actual}")]
    CountMismatchError { expected: u64, actual: u64 },

    #[error("Expected {expected} total bytes, but got {actual}")]
    SizeMismatchError { expected: u64, actual: u64 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Listing worker failed: {message}")]
    WorkerError { message: String },
}

impl DatafluxError {
    /// Exit code reported by the binaries. Any failure is non-zero so a CI
    /// wrapper running with fail-fast semantics aborts on the first error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DatafluxError::ConfigError { .. }
            | DatafluxError::InvalidConfigValueError { .. } => 2,
            DatafluxError::CountMismatchError { .. } | DatafluxError::SizeMismatchError { .. } => {
                3
            }
            _ => 1,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DatafluxError::CountMismatchError { expected, actual } => format!(
                "bucket contents changed or listing is incomplete: expected {} objects, listed {}",
                expected, actual
            ),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatafluxError>;
