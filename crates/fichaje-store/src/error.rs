use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure (connection refused, TLS, timeout).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Service rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
