//! # plume-shared
//!
//! Identifier newtypes, domain models and the client-facing error taxonomy
//! shared between the backend gateway and the state containers.  This crate
//! performs no I/O.

pub mod models;
pub mod types;

mod error;

pub use error::ClientError;
pub use models::*;
pub use types::{ConversationId, MessageId, ProfileId};

/// Convenience alias used throughout the client crates.
pub type Result<T> = std::result::Result<T, ClientError>;
