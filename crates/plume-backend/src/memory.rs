//! In-memory implementation of the [`Backend`] trait.
//!
//! Keeps credentials, records and stored objects in `Mutex`-guarded tables
//! and evaluates [`Query`] directly over JSON values.  Used as the test
//! double across the workspace; semantics mirror [`HttpBackend`]
//! (unique credential keys, a minimum-length secret policy,
//! backend-assigned ids and creation timestamps).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BackendError;
use crate::gateway::{AuthUser, Backend, Record};
use crate::query::{Filter, Query};

/// Secrets shorter than this fail the credential policy.
const MIN_SECRET_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Credential {
    id: Uuid,
    secret: String,
}

#[derive(Debug, Default)]
struct MemState {
    /// Credential key -> credential.
    credentials: HashMap<String, Credential>,
    /// Currently open session.
    session: Option<AuthUser>,
    /// Collection name -> records.
    tables: HashMap<String, Vec<Record>>,
    /// "bucket/path" -> bytes.
    objects: HashMap<String, Vec<u8>>,
}

/// Backend gateway held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Internal("state lock poisoned".to_string()))
    }

    /// Snapshot of a collection, for assertions in tests.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .map(|guard| guard.tables.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of registered credentials, for assertions in tests.
    pub fn credential_count(&self) -> usize {
        self.state
            .lock()
            .map(|guard| guard.credentials.len())
            .unwrap_or(0)
    }

    /// Whether a credential key is registered, for assertions in tests.
    pub fn credential_exists(&self, key: &str) -> bool {
        self.state
            .lock()
            .map(|guard| guard.credentials.contains_key(key))
            .unwrap_or(false)
    }

    /// Stored object bytes, for assertions in tests.
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.objects.get(&format!("{}/{}", bucket, path)).cloned())
    }

    /// Assign backend-owned columns and enforce id uniqueness.
    fn prepare_row(existing: &[Record], mut row: Record) -> Result<Record, BackendError> {
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            row.insert(
                "created_at".to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }

        let id = row.get("id").cloned();
        if existing.iter().any(|r| r.get("id") == id.as_ref()) {
            return Err(BackendError::Conflict(format!(
                "duplicate id {:?}",
                id
            )));
        }
        Ok(row)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(BackendError::Policy(format!(
                "secret must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        let mut state = self.lock()?;
        if state.credentials.contains_key(key) {
            return Err(BackendError::Conflict(format!(
                "credential key already registered: {}",
                key
            )));
        }

        let user = AuthUser {
            id: Uuid::new_v4(),
            key: key.to_string(),
        };
        state.credentials.insert(
            key.to_string(),
            Credential {
                id: user.id,
                secret: secret.to_string(),
            },
        );
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let key = state
            .credentials
            .iter()
            .find(|(_, cred)| cred.id == user_id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| BackendError::NotFound(format!("credential {}", user_id)))?;

        state.credentials.remove(&key);
        if state.session.as_ref().map(|u| u.id) == Some(user_id) {
            state.session = None;
        }
        Ok(())
    }

    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError> {
        let mut state = self.lock()?;
        let cred = state
            .credentials
            .get(key)
            .filter(|cred| cred.secret == secret)
            .cloned()
            .ok_or_else(|| BackendError::Unauthorized("invalid credentials".to_string()))?;

        let user = AuthUser {
            id: cred.id,
            key: key.to_string(),
        };
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.lock()?.session.clone())
    }

    async fn revoke_session(&self) -> Result<(), BackendError> {
        self.lock()?.session = None;
        Ok(())
    }

    async fn query_records(&self, query: Query) -> Result<Vec<Record>, BackendError> {
        let state = self.lock()?;
        let mut rows: Vec<Record> = state
            .tables
            .get(&query.collection)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(ref order) = query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_columns(a, b, &order.column);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError> {
        let mut rows = self.insert_records(collection, vec![fields]).await?;
        rows.pop().ok_or_else(|| {
            BackendError::InvalidResponse("insert returned no representation".to_string())
        })
    }

    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError> {
        let mut state = self.lock()?;
        let table = state.tables.entry(collection.to_string()).or_default();

        // Validate the whole batch before touching the table so a failed
        // batch inserts nothing.
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let row = Self::prepare_row(table.as_slice(), row)?;
            prepared.push(row);
        }

        table.extend(prepared.iter().cloned());
        Ok(prepared)
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError> {
        let mut state = self.lock()?;
        let id_value = Value::String(id.to_string());
        let row = state
            .tables
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id") == Some(&id_value)))
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;

        for (column, value) in fields {
            row.insert(column, value);
        }
        Ok(row.clone())
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let id_value = Value::String(id.to_string());
        let table = state
            .tables
            .get_mut(collection)
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;

        let before = table.len();
        table.retain(|r| r.get("id") != Some(&id_value));
        if table.len() == before {
            return Err(BackendError::NotFound(format!("{}/{}", collection, id)));
        }
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        let mut state = self.lock()?;
        state.objects.insert(format!("{}/{}", bucket, key), bytes);
        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }
}

fn matches_filter(row: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => row.get(column) == Some(value),
        Filter::ILike { column, substring } => row
            .get(column)
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase().contains(&substring.to_lowercase()))
            .unwrap_or(false),
        Filter::In { column, values } => row
            .get(column)
            .map(|v| values.contains(v))
            .unwrap_or(false),
    }
}

/// Column comparison for ordering.  RFC 3339 timestamps with a fixed
/// precision compare correctly as strings.
fn compare_columns(a: &Record, b: &Record, column: &str) -> Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}
