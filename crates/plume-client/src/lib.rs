//! # plume-client
//!
//! The client-side state layer of the Plume messenger: two state containers
//! that mediate between a presentation layer and the backend gateway.
//!
//! [`SessionManager`] owns the authenticated identity and the sign-up /
//! sign-in / sign-out / profile-update operations.  [`ConversationManager`]
//! owns the conversation list, the selected conversation and its messages,
//! and the load / search / create / send operations.
//!
//! Construct one instance of each per running client and hand them to the
//! UI by reference; there are no ambient globals.

pub mod chat;
pub mod session;

mod rows;

#[cfg(test)]
mod testutil;

use plume_backend::BackendError;
use plume_shared::ClientError;
use tracing_subscriber::{fmt, EnvFilter};

pub use chat::ConversationManager;
pub use session::SessionManager;

/// Install the global tracing subscriber for an embedding application.
///
/// Honors `RUST_LOG`; defaults to debug output for the plume crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("plume_client=debug,plume_backend=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

// Backend errors carry no operation context, so each call site picks the
// taxonomy variant for its phase.  Timeouts stay transient everywhere.

pub(crate) fn map_query(e: BackendError) -> ClientError {
    match e {
        BackendError::Timeout => ClientError::Timeout,
        other => ClientError::Query(other.to_string()),
    }
}

pub(crate) fn map_insert(e: BackendError) -> ClientError {
    match e {
        BackendError::Timeout => ClientError::Timeout,
        other => ClientError::Insert(other.to_string()),
    }
}

pub(crate) fn map_update(e: BackendError) -> ClientError {
    match e {
        BackendError::Timeout => ClientError::Timeout,
        other => ClientError::Update(other.to_string()),
    }
}

pub(crate) fn map_upload(e: BackendError) -> ClientError {
    match e {
        BackendError::Timeout => ClientError::Timeout,
        other => ClientError::Upload(other.to_string()),
    }
}
