//! HTTP implementation of the [`Backend`] trait.
//!
//! Speaks a PostgREST/GoTrue-style REST surface: record queries under
//! `/rest/v1/`, authentication under `/auth/v1/`, object storage under
//! `/storage/v1/`.  Every request carries the configured per-request
//! deadline; an elapsed deadline surfaces as [`BackendError::Timeout`].

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::gateway::{AuthUser, Backend, Record};
use crate::query::Query;

/// Session state held between authenticate and revoke.
#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user: AuthUser,
}

/// Wire shape of GoTrue signup / token responses.
#[derive(Debug, Deserialize)]
struct AuthSessionPayload {
    access_token: String,
    user: AuthUserPayload,
}

#[derive(Debug, Deserialize)]
struct AuthUserPayload {
    id: Uuid,
    email: String,
}

/// Backend gateway over HTTP.
pub struct HttpBackend {
    http: reqwest::Client,
    config: BackendConfig,
    session: Mutex<Option<Session>>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(map_reqwest)?;

        info!(url = %config.url, "HTTP backend initialized");

        Ok(Self {
            http,
            config,
            session: Mutex::new(None),
        })
    }

    fn rest_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, collection)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, endpoint)
    }

    /// Current bearer token: the session access token, or the anonymous
    /// API key when no session is open.
    fn bearer(&self) -> Result<String, BackendError> {
        let guard = self
            .session
            .lock()
            .map_err(|_| BackendError::Internal("session lock poisoned".to_string()))?;
        Ok(guard
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.api_key.clone()))
    }

    fn set_session(&self, session: Option<Session>) -> Result<(), BackendError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| BackendError::Internal("session lock poisoned".to_string()))?;
        *guard = session;
        Ok(())
    }

    /// Attach the API key and bearer token every request needs.
    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        Ok(builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer()?))
    }

    /// Send a request and return the response body on success, mapping
    /// non-success statuses onto the error taxonomy.
    async fn send(&self, builder: RequestBuilder) -> Result<String, BackendError> {
        let response = builder.send().await.map_err(map_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(map_status(status, body))
        }
    }

    async fn open_session(&self, url: String, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        let body = serde_json::json!({ "email": key, "password": secret });
        let builder = self.authorized(self.http.post(url))?.json(&body);
        let text = self.send(builder).await?;

        let payload: AuthSessionPayload = serde_json::from_str(&text)?;
        let user = AuthUser {
            id: payload.user.id,
            key: payload.user.email,
        };
        self.set_session(Some(Session {
            access_token: payload.access_token,
            user: user.clone(),
        }))?;
        Ok(user)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn register_credential(&self, key: &str, secret: &str)
        -> Result<AuthUser, BackendError> {
        let result = self.open_session(self.auth_url("signup"), key, secret).await;
        // GoTrue reports policy failures (weak password) as 422.
        match result {
            Err(BackendError::Api { status: 422, message }) => Err(BackendError::Policy(message)),
            other => other,
        }
    }

    async fn unregister_credential(&self, user_id: Uuid) -> Result<(), BackendError> {
        let service_key = self.config.service_key.as_ref().ok_or_else(|| {
            BackendError::Unauthorized("no service key configured".to_string())
        })?;

        let builder = self
            .http
            .delete(self.auth_url(&format!("admin/users/{}", user_id)))
            .header("apikey", &self.config.api_key)
            .bearer_auth(service_key);
        self.send(builder).await?;

        // A deleted identity must not keep answering current_user().
        let cached = {
            let guard = self
                .session
                .lock()
                .map_err(|_| BackendError::Internal("session lock poisoned".to_string()))?;
            guard.as_ref().map(|s| s.user.id)
        };
        if cached == Some(user_id) {
            self.set_session(None)?;
        }

        info!(user_id = %user_id, "Credential unregistered");
        Ok(())
    }

    async fn authenticate(&self, key: &str, secret: &str) -> Result<AuthUser, BackendError> {
        let url = format!("{}?grant_type=password", self.auth_url("token"));
        let result = self.open_session(url, key, secret).await;
        // GoTrue reports a credential mismatch as 400.
        match result {
            Err(BackendError::Api { status: 400, message }) => {
                Err(BackendError::Unauthorized(message))
            }
            other => other,
        }
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let guard = self
            .session
            .lock()
            .map_err(|_| BackendError::Internal("session lock poisoned".to_string()))?;
        Ok(guard.as_ref().map(|s| s.user.clone()))
    }

    async fn revoke_session(&self) -> Result<(), BackendError> {
        let token = {
            let guard = self
                .session
                .lock()
                .map_err(|_| BackendError::Internal("session lock poisoned".to_string()))?;
            guard.as_ref().map(|s| s.access_token.clone())
        };

        // Local session state clears even if the remote revocation fails.
        self.set_session(None)?;

        if let Some(token) = token {
            let builder = self
                .http
                .post(self.auth_url("logout"))
                .header("apikey", &self.config.api_key)
                .bearer_auth(token);
            if let Err(e) = self.send(builder).await {
                warn!(error = %e, "Remote session revocation failed");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn query_records(&self, query: Query) -> Result<Vec<Record>, BackendError> {
        let params = query.to_params();
        debug!(collection = %query.collection, params = ?params, "Querying records");

        let builder = self
            .authorized(self.http.get(self.rest_url(&query.collection)))?
            .query(&params);
        let text = self.send(builder).await?;

        Ok(serde_json::from_str(&text)?)
    }

    async fn insert_record(&self, collection: &str, fields: Record)
        -> Result<Record, BackendError> {
        let rows = self.insert_records(collection, vec![fields]).await?;
        rows.into_iter().next().ok_or_else(|| {
            BackendError::InvalidResponse("insert returned no representation".to_string())
        })
    }

    async fn insert_records(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, BackendError> {
        debug!(collection = %collection, count = rows.len(), "Inserting records");

        let builder = self
            .authorized(self.http.post(self.rest_url(collection)))?
            .header("Prefer", "return=representation")
            .json(&rows);
        let text = self.send(builder).await?;

        Ok(serde_json::from_str(&text)?)
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        fields: Record,
    ) -> Result<Record, BackendError> {
        debug!(collection = %collection, id = %id, "Updating record");

        let builder = self
            .authorized(self.http.patch(self.rest_url(collection)))?
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&fields);
        let text = self.send(builder).await?;

        let rows: Vec<Record> = serde_json::from_str(&text)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), BackendError> {
        debug!(collection = %collection, id = %id, "Deleting record");

        let builder = self
            .authorized(self.http.delete(self.rest_url(collection)))?
            .query(&[("id", format!("eq.{}", id))]);
        self.send(builder).await?;
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        let size = bytes.len();
        let url = format!("{}/storage/v1/object/{}/{}", self.config.url, bucket, key);
        let builder = self
            .authorized(self.http.post(url))?
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        self.send(builder).await?;

        debug!(bucket = %bucket, key = %key, size, "Object uploaded");
        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, bucket, path
        )
    }
}

/// Collapse reqwest failures into the gateway taxonomy.
fn map_reqwest(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Http(e)
    }
}

fn map_status(status: StatusCode, message: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        other => BackendError::Api {
            status: other.as_u16(),
            message,
        },
    }
}
