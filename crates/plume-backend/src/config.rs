//! Backend configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a client can start against a
//! local development backend with zero configuration.

use std::time::Duration;

/// Backend gateway configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend service.
    /// Env: `PLUME_BACKEND_URL`
    /// Default: `http://localhost:54321`
    pub url: String,

    /// Publishable API key sent with every request.
    /// Env: `PLUME_API_KEY`
    /// Default: empty (development only).
    pub api_key: String,

    /// Privileged service key used for credential administration
    /// (sign-up rollback).  Never shipped to end-user builds.
    /// Env: `PLUME_SERVICE_KEY`
    /// Default: none (rollback falls back to session revocation).
    pub service_key: Option<String>,

    /// Per-request deadline.  Elapsed deadlines surface as a transient
    /// timeout error.
    /// Env: `PLUME_REQUEST_TIMEOUT_SECS`
    /// Default: 10 seconds.
    pub request_timeout: Duration,

    /// Object storage bucket holding message attachments.
    /// Env: `PLUME_STORAGE_BUCKET`
    /// Default: `message-files`
    pub storage_bucket: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            service_key: None,
            request_timeout: Duration::from_secs(10),
            storage_bucket: "message-files".to_string(),
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("PLUME_BACKEND_URL") {
            config.url = url.trim_end_matches('/').to_string();
        }

        if let Ok(key) = std::env::var("PLUME_API_KEY") {
            config.api_key = key;
        }

        if let Ok(key) = std::env::var("PLUME_SERVICE_KEY") {
            if !key.is_empty() {
                config.service_key = Some(key);
            }
        }

        if let Ok(val) = std::env::var("PLUME_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.request_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid PLUME_REQUEST_TIMEOUT_SECS, using default"
                );
            }
        }

        if let Ok(bucket) = std::env::var("PLUME_STORAGE_BUCKET") {
            if !bucket.is_empty() {
                config.storage_bucket = bucket;
            }
        }

        config
    }
}
