//! Session state container: the authenticated identity and the operations
//! that change it.
//!
//! The profile snapshot is single-writer and guarded by a `Mutex` that is
//! never held across an await; operations lock briefly to read or publish
//! state around backend round-trips, the same discipline the rest of the
//! workspace follows.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};

use plume_backend::{Backend, BackendError, Filter, Query, Record};
use plume_shared::{ClientError, Profile, ProfileId, ProfileUpdate, Result};

use crate::rows::{decode, ProfileRow};
use crate::{map_query, map_update};

/// Length of the random suffix in a synthetic credential key.
const CREDENTIAL_SUFFIX_LEN: usize = 12;

/// Owns the current authenticated profile, or none when signed out.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    current: Mutex<Option<Profile>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            current: Mutex::new(None),
        }
    }

    /// Snapshot of the current profile for the UI.
    pub fn current_profile(&self) -> Option<Profile> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn snapshot(&self) -> Result<MutexGuard<'_, Option<Profile>>> {
        self.current
            .lock()
            .map_err(|_| ClientError::Internal("profile lock poisoned".to_string()))
    }

    /// Register a new user.
    ///
    /// Checks username uniqueness, registers a credential under a synthetic
    /// key, then creates the profile record.  A profile-creation failure
    /// rolls the credential back so no orphaned credential survives.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<Profile> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::InvalidUsername(
                "username must not be empty".to_string(),
            ));
        }

        let taken = self
            .backend
            .query_records(
                Query::new("profiles")
                    .filter(Filter::eq("username", username))
                    .limit(1),
            )
            .await
            .map_err(map_query)?;
        if !taken.is_empty() {
            return Err(ClientError::DuplicateUsername);
        }

        // The credential key is an internal, email-shaped identifier; the
        // display username never doubles as a credential.
        let key = synthetic_credential_key(username);
        let auth = self
            .backend
            .register_credential(&key, password)
            .await
            .map_err(|e| match e {
                BackendError::Timeout => ClientError::Timeout,
                other => ClientError::AuthRegistration(other.to_string()),
            })?;

        let mut fields = Record::new();
        fields.insert("id".to_string(), json!(auth.id));
        fields.insert("username".to_string(), json!(username));
        fields.insert("credential_key".to_string(), json!(key));
        fields.insert("avatar_url".to_string(), serde_json::Value::Null);

        if let Err(e) = self.backend.insert_record("profiles", fields).await {
            warn!(username = %username, error = %e, "Profile creation failed, rolling back credential");
            if let Err(rollback) = self.backend.unregister_credential(auth.id).await {
                warn!(error = %rollback, "Credential rollback failed");
            }
            // Registration opened a session; the credential delete is an
            // admin operation and does not end it.
            if let Err(revoke) = self.backend.revoke_session().await {
                warn!(error = %revoke, "Session revocation after rollback failed");
            }
            return Err(ClientError::ProfileCreation(e.to_string()));
        }

        let profile = Profile {
            id: ProfileId(auth.id),
            username: username.to_string(),
            avatar_url: None,
        };
        *self.snapshot()? = Some(profile.clone());

        info!(username = %username, id = %profile.id, "Signed up");
        Ok(profile)
    }

    /// Authenticate an existing user by display username.
    ///
    /// If the profile cannot be loaded after a successful authentication,
    /// the session is revoked before the error is returned so the UI never
    /// observes an authenticated-but-profile-less state.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Profile> {
        let username = username.trim();

        let mut rows = self
            .backend
            .query_records(
                Query::new("profiles")
                    .filter(Filter::eq("username", username))
                    .limit(1),
            )
            .await
            .map_err(map_query)?;
        let row: ProfileRow = match rows.pop() {
            Some(record) => decode(record)?,
            None => return Err(ClientError::UserNotFound),
        };
        let key = row.credential_key.clone().ok_or(ClientError::UserNotFound)?;

        self.backend
            .authenticate(&key, password)
            .await
            .map_err(|e| match e {
                BackendError::Timeout => ClientError::Timeout,
                _ => ClientError::InvalidCredentials,
            })?;

        // Reload the profile by id rather than trusting the pre-auth row.
        let loaded = self
            .backend
            .query_records(
                Query::new("profiles")
                    .filter(Filter::eq("id", json!(row.id)))
                    .limit(1),
            )
            .await;

        let profile = match loaded {
            Ok(mut records) => match records.pop() {
                Some(record) => decode::<ProfileRow>(record)?.into_profile(),
                None => return Err(self.fail_profile_load("profile record missing").await),
            },
            Err(e) => return Err(self.fail_profile_load(&e.to_string()).await),
        };

        *self.snapshot()? = Some(profile.clone());

        info!(username = %profile.username, id = %profile.id, "Signed in");
        Ok(profile)
    }

    /// Compensating sign-out after a post-authentication profile-load
    /// failure.
    async fn fail_profile_load(&self, reason: &str) -> ClientError {
        warn!(error = %reason, "Profile load failed after authentication, revoking session");
        if let Err(e) = self.backend.revoke_session().await {
            warn!(error = %e, "Compensating session revocation failed");
        }
        ClientError::ProfileLoad(reason.to_string())
    }

    /// End the session.  The local snapshot clears even when the backend
    /// revocation fails, so the UI always returns to the signed-out state.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.backend.revoke_session().await;

        *self.snapshot()? = None;

        match result {
            Ok(()) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Backend session revocation failed, local state cleared");
                Err(ClientError::SessionRevocation(e.to_string()))
            }
        }
    }

    /// Persist a partial profile update and merge it into the snapshot.
    /// Unmodified fields are preserved.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let current = self
            .current_profile()
            .ok_or(ClientError::NotAuthenticated)?;

        if update.is_empty() {
            return Ok(current);
        }

        let mut fields = Record::new();
        if let Some(ref username) = update.username {
            fields.insert("username".to_string(), json!(username));
        }
        if let Some(ref avatar_url) = update.avatar_url {
            fields.insert("avatar_url".to_string(), json!(avatar_url));
        }

        self.backend
            .update_record("profiles", current.id.0, fields)
            .await
            .map_err(map_update)?;

        let mut guard = self.snapshot()?;
        let profile = match guard.as_mut() {
            Some(profile) => {
                if let Some(username) = update.username {
                    profile.username = username;
                }
                if let Some(avatar_url) = update.avatar_url {
                    profile.avatar_url = Some(avatar_url);
                }
                profile.clone()
            }
            // Signed out between the round-trip and the merge.
            None => return Err(ClientError::NotAuthenticated),
        };

        info!(id = %profile.id, "Profile updated");
        Ok(profile)
    }
}

/// Derive an email-shaped, globally unique credential key from a username.
/// The username part is sanitized for format only; uniqueness comes from
/// the random suffix.
fn synthetic_credential_key(username: &str) -> String {
    let sanitized: String = username
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CREDENTIAL_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}.{}@plume.chat", sanitized, suffix.to_lowercase())
}
