//! The [`Backend`] trait: the full capability surface the state containers
//! consume.  Implementations must keep each operation's effects atomic from
//! the caller's point of view; multi-step sagas and their compensations live
//! above this trait, in the state containers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackendError;
use crate::query::Query;

/// A structured record, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// An authenticated backend identity.
///
/// The `key` is the synthetic credential key (email-shaped), never the
/// display username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub key: String,
}

/// Backend gateway: authentication, record storage, object storage.
#[async_trait]
pub trait Backend: Send + Sync {
    // -- Authentication -----------------------------------------------------

    /// Create a new authenticable identity and open a session for it.
    /// Fails if the key is already registered or the secret fails policy.
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError>;

    /// Delete a credential.  Compensating action for the sign-up saga.
    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError>;

    /// Authenticate and open a session.  Fails on mismatch.
    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError>;

    /// The currently authenticated identity, if any.
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;

    /// End the current session.
    async fn revoke_session(&self) -> Result<(), BackendError>;

    // -- Record storage -----------------------------------------------------

    /// Return records matching the query.
    async fn query_records(&self, query: Query) -> Result<Vec<Record>, BackendError>;

    /// Insert one record, returning it with backend-assigned columns
    /// (id, created_at) filled in.
    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError>;

    /// Insert several records in one atomic batch.
    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError>;

    /// Update columns of one record, returning the updated record.
    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError>;

    /// Delete one record.  Compensating action for the conversation saga.
    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError>;

    // -- Object storage -----------------------------------------------------

    /// Store raw bytes under the given key, returning the stored path.
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError>;

    /// Public download URL for a stored path.  Pure lookup.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}
