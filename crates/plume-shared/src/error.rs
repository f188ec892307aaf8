use thiserror::Error;

/// Errors surfaced by the state containers to the presentation layer.
///
/// Every operation either completes its full effect or fails with one of
/// these; partial effects (orphaned credentials, half-created conversations)
/// are rolled back before the error is returned.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Username is empty or otherwise unusable.
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// The requested username is already taken.
    #[error("Username already taken")]
    DuplicateUsername,

    /// The backend rejected the new credential (e.g. weak password).
    #[error("Registration failed: {0}")]
    AuthRegistration(String),

    /// Profile record creation failed after credential registration.
    /// The credential has been rolled back.
    #[error("Profile creation failed: {0}")]
    ProfileCreation(String),

    /// No profile matches the given username, or its credential could not
    /// be resolved.
    #[error("User not found")]
    UserNotFound,

    /// Password mismatch during sign-in.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Profile loading failed after successful authentication.  The session
    /// has been revoked so no authenticated-but-profile-less state leaks.
    #[error("Profile load failed: {0}")]
    ProfileLoad(String),

    /// The operation requires an authenticated session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The backend failed to revoke the session.  The local snapshot is
    /// cleared regardless.
    #[error("Session revocation failed: {0}")]
    SessionRevocation(String),

    /// Object storage upload failed; no message was created.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Record insertion failed.
    #[error("Insert failed: {0}")]
    Insert(String),

    /// Record query failed; prior in-memory state is left unchanged.
    #[error("Query failed: {0}")]
    Query(String),

    /// Profile update failed.
    #[error("Update failed: {0}")]
    Update(String),

    /// A message needs text content or a file, it had neither.
    #[error("Message is empty")]
    EmptyMessage,

    /// The backend did not answer within the configured deadline.
    /// Transient; the caller may retry.
    #[error("Backend request timed out")]
    Timeout,

    /// Internal state error (poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether the failure is transient and worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }
}
