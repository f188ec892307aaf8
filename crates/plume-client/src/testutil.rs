//! Test doubles shared by the session and conversation tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use plume_backend::{AuthUser, Backend, BackendError, MemoryBackend, Query, Record};

pub(crate) fn memory_backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

/// Delegates to an inner backend but fails every insert into one
/// collection, to drive the compensating-action paths.
pub(crate) struct FailingInserts<B> {
    inner: Arc<B>,
    collection: String,
}

impl<B: Backend> FailingInserts<B> {
    pub fn new(inner: Arc<B>, collection: &str) -> Self {
        Self {
            inner,
            collection: collection.to_string(),
        }
    }

    fn induced(&self) -> BackendError {
        BackendError::Api {
            status: 500,
            message: format!("induced insert failure on {}", self.collection),
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for FailingInserts<B> {
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        self.inner.register_credential(key, secret).await
    }

    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError> {
        self.inner.unregister_credential(user_id).await
    }

    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError> {
        self.inner.authenticate(key, secret).await
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.inner.current_user().await
    }

    async fn revoke_session(&self) -> Result<(), BackendError> {
        self.inner.revoke_session().await
    }

    async fn query_records(&self, query: Query) -> Result<Vec<Record>, BackendError> {
        self.inner.query_records(query).await
    }

    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError> {
        if collection == self.collection {
            return Err(self.induced());
        }
        self.inner.insert_record(collection, fields).await
    }

    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError> {
        if collection == self.collection {
            return Err(self.induced());
        }
        self.inner.insert_records(collection, rows).await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError> {
        self.inner.update_record(collection, id, fields).await
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError> {
        self.inner.delete_record(collection, id).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        self.inner.upload_object(bucket, key, bytes).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }
}

/// Mirrors the session handling of the HTTP backend: registration and
/// authentication cache a session locally, `current_user` is a local read,
/// and the admin credential delete leaves the cache alone.  Only
/// `revoke_session` clears it.
pub(crate) struct CachedSessionBackend {
    inner: Arc<MemoryBackend>,
    session: Mutex<Option<AuthUser>>,
}

impl CachedSessionBackend {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Backend for CachedSessionBackend {
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        let user = self.inner.register_credential(key, secret).await?;
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError> {
        self.inner.unregister_credential(user_id).await
    }

    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError> {
        let user = self.inner.authenticate(key, secret).await?;
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn revoke_session(&self) -> Result<(), BackendError> {
        *self.session.lock().unwrap() = None;
        self.inner.revoke_session().await
    }

    async fn query_records(&self, query: Query) -> Result<Vec<Record>, BackendError> {
        self.inner.query_records(query).await
    }

    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError> {
        self.inner.insert_record(collection, fields).await
    }

    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError> {
        self.inner.insert_records(collection, rows).await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError> {
        self.inner.update_record(collection, id, fields).await
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError> {
        self.inner.delete_record(collection, id).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        self.inner.upload_object(bucket, key, bytes).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }
}

/// Delegates everything but answers every record query with a timeout.
pub(crate) struct TimedOutQueries {
    inner: Arc<MemoryBackend>,
}

impl TimedOutQueries {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Backend for TimedOutQueries {
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        self.inner.register_credential(key, secret).await
    }

    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError> {
        self.inner.unregister_credential(user_id).await
    }

    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError> {
        self.inner.authenticate(key, secret).await
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.inner.current_user().await
    }

    async fn revoke_session(&self) -> Result<(), BackendError> {
        self.inner.revoke_session().await
    }

    async fn query_records(&self, _query: Query) -> Result<Vec<Record>, BackendError> {
        Err(BackendError::Timeout)
    }

    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError> {
        self.inner.insert_record(collection, fields).await
    }

    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError> {
        self.inner.insert_records(collection, rows).await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError> {
        self.inner.update_record(collection, id, fields).await
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError> {
        self.inner.delete_record(collection, id).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        self.inner.upload_object(bucket, key, bytes).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }
}
