//! # plume-backend
//!
//! The backend gateway consumed by the state containers.  Three capability
//! groups sit behind the [`Backend`] trait: credential-based authentication,
//! structured record storage with filter/sort/limit query primitives, and
//! binary object storage with public URL retrieval.
//!
//! [`HttpBackend`] speaks a PostgREST/GoTrue-style REST surface over
//! `reqwest`.  [`MemoryBackend`] implements the same contract in process
//! memory and is the test double used throughout the workspace.

pub mod config;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod query;

mod error;

pub use config::BackendConfig;
pub use error::BackendError;
pub use gateway::{AuthUser, Backend, Record};
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use query::{Filter, OrderBy, Query};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackendError>;
