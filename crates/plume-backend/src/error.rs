use thiserror::Error;

/// Errors produced by the backend gateway.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend did not answer within the configured deadline.
    #[error("Request timed out")]
    Timeout,

    /// Non-success response with no more specific mapping.
    #[error("Backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Unique or foreign-key constraint violation.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// The targeted record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Missing or invalid credentials for the attempted operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The secret was rejected by the credential policy.
    #[error("Credential policy violation: {0}")]
    Policy(String),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend answered with a well-formed but unusable payload.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Internal state error (poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}
