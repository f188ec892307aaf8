//! Conversation state container: the conversation list, the selected
//! conversation, and the messages of the selected conversation.
//!
//! Load operations replace their slice of state wholesale and leave prior
//! state untouched on failure.  `send_message` is the one incremental
//! update: the confirmed message is appended only after the backend accepts
//! it, so the UI never shows a message the server has not persisted.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use plume_backend::{AuthUser, Backend, Filter, OrderBy, Query, Record};
use plume_shared::{
    ClientError, Conversation, ConversationId, FileUpload, Message, Profile, ProfileId, Result,
};

use crate::rows::{decode, decode_all, MessageRow, ParticipantRow, ProfileRow};
use crate::{map_insert, map_query, map_upload};

/// Maximum number of user-search results.
const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Default)]
struct ChatState {
    conversations: Vec<Conversation>,
    selected: Option<Conversation>,
    messages: Vec<Message>,
}

/// Owns the conversation list and message history for one client.
pub struct ConversationManager {
    backend: Arc<dyn Backend>,
    /// Object storage bucket for message attachments.
    bucket: String,
    state: Mutex<ChatState>,
}

impl ConversationManager {
    pub fn new(backend: Arc<dyn Backend>, bucket: &str) -> Self {
        Self {
            backend,
            bucket: bucket.to_string(),
            state: Mutex::new(ChatState::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, ChatState>> {
        self.state
            .lock()
            .map_err(|_| ClientError::Internal("chat state lock poisoned".to_string()))
    }

    async fn authenticated(&self) -> Result<AuthUser> {
        self.backend
            .current_user()
            .await
            .map_err(map_query)?
            .ok_or(ClientError::NotAuthenticated)
    }

    // -- Snapshots for the UI ----------------------------------------------

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state
            .lock()
            .map(|s| s.conversations.clone())
            .unwrap_or_default()
    }

    pub fn selected(&self) -> Option<Conversation> {
        self.state.lock().ok().and_then(|s| s.selected.clone())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    // -- Operations ---------------------------------------------------------

    /// Reload every conversation the current user participates in, each with
    /// its resolved participant profiles and most recent message.
    ///
    /// The in-memory list is replaced only after every fetch succeeded; on
    /// failure the prior list stays visible.
    pub async fn load_conversations(&self) -> Result<()> {
        let user = self.authenticated().await?;

        let own_links: Vec<ParticipantRow> = decode_all(
            self.backend
                .query_records(
                    Query::new("conversation_participants")
                        .filter(Filter::eq("profile_id", json!(user.id))),
                )
                .await
                .map_err(map_query)?,
        )?;

        let mut conversations = Vec::with_capacity(own_links.len());
        for link in own_links {
            conversations.push(self.fetch_conversation(link.conversation_id).await?);
        }

        let count = conversations.len();
        self.state()?.conversations = conversations;

        info!(count, "Conversations loaded");
        Ok(())
    }

    /// Fetch one conversation with participants and last-message summary.
    async fn fetch_conversation(&self, conversation_id: Uuid) -> Result<Conversation> {
        let links: Vec<ParticipantRow> = decode_all(
            self.backend
                .query_records(
                    Query::new("conversation_participants")
                        .filter(Filter::eq("conversation_id", json!(conversation_id))),
                )
                .await
                .map_err(map_query)?,
        )?;

        let profile_ids: Vec<serde_json::Value> =
            links.iter().map(|l| json!(l.profile_id)).collect();
        let profiles: Vec<ProfileRow> = decode_all(
            self.backend
                .query_records(Query::new("profiles").filter(Filter::is_in("id", profile_ids)))
                .await
                .map_err(map_query)?,
        )?;

        let mut last = decode_all::<MessageRow>(
            self.backend
                .query_records(
                    Query::new("messages")
                        .filter(Filter::eq("conversation_id", json!(conversation_id)))
                        .order(OrderBy::desc("created_at"))
                        .limit(1),
                )
                .await
                .map_err(map_query)?,
        )?;

        Ok(Conversation {
            id: ConversationId(conversation_id),
            participants: profiles.into_iter().map(ProfileRow::into_profile).collect(),
            last_message: last.pop().map(MessageRow::into_message),
        })
    }

    /// Reload the full message history of a conversation, oldest first.
    pub async fn load_messages(&self, conversation_id: ConversationId) -> Result<()> {
        let rows: Vec<MessageRow> = decode_all(
            self.backend
                .query_records(
                    Query::new("messages")
                        .filter(Filter::eq("conversation_id", json!(conversation_id.0)))
                        .order(OrderBy::asc("created_at")),
                )
                .await
                .map_err(map_query)?,
        )?;

        let messages: Vec<Message> = rows.into_iter().map(MessageRow::into_message).collect();
        debug!(conversation = %conversation_id, count = messages.len(), "Messages loaded");

        self.state()?.messages = messages;
        Ok(())
    }

    /// Pure state transition.  The caller follows up with `load_messages`
    /// after selecting; deselecting clears the stale history.
    pub fn select_conversation(&self, conversation: Option<Conversation>) -> Result<()> {
        let mut state = self.state()?;
        if conversation.is_none() {
            state.messages.clear();
        }
        state.selected = conversation;
        Ok(())
    }

    /// Start a conversation with another user.
    ///
    /// The conversation row and both participant links form one logical
    /// creation: if the links cannot be inserted, the conversation row is
    /// deleted again so no orphaned conversation survives.
    pub async fn create_conversation(&self, other: ProfileId) -> Result<ConversationId> {
        let user = self.authenticated().await?;

        let row = self
            .backend
            .insert_record("conversations", Record::new())
            .await
            .map_err(map_insert)?;
        let conversation_id = record_id(&row)?;

        let link = |profile_id: serde_json::Value| {
            let mut fields = Record::new();
            fields.insert("conversation_id".to_string(), json!(conversation_id));
            fields.insert("profile_id".to_string(), profile_id);
            fields
        };
        let links = vec![link(json!(user.id)), link(json!(other.0))];

        if let Err(e) = self
            .backend
            .insert_records("conversation_participants", links)
            .await
        {
            warn!(conversation = %conversation_id, error = %e, "Participant links failed, deleting conversation");
            if let Err(rollback) = self
                .backend
                .delete_record("conversations", conversation_id)
                .await
            {
                warn!(error = %rollback, "Conversation rollback failed");
            }
            return Err(map_insert(e));
        }

        info!(conversation = %conversation_id, other = %other, "Conversation created");

        self.load_conversations().await?;
        Ok(ConversationId(conversation_id))
    }

    /// Send a message with text content, a file, or both.
    ///
    /// The local message list gains the new message only after the backend
    /// confirms the insert; any upload or insert failure leaves local state
    /// untouched.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        file: Option<FileUpload>,
    ) -> Result<Message> {
        let user = self.authenticated().await?;

        let content = content.trim();
        if content.is_empty() && file.is_none() {
            return Err(ClientError::EmptyMessage);
        }

        let mut fields = Record::new();
        fields.insert("conversation_id".to_string(), json!(conversation_id.0));
        fields.insert("sender_id".to_string(), json!(user.id));
        fields.insert(
            "content".to_string(),
            if content.is_empty() {
                serde_json::Value::Null
            } else {
                json!(content)
            },
        );

        if let Some(file) = file {
            let size = file.bytes.len() as i64;
            let key = storage_key(&file.name);
            let path = self
                .backend
                .upload_object(&self.bucket, &key, file.bytes)
                .await
                .map_err(map_upload)?;
            let url = self.backend.public_url(&self.bucket, &path);

            debug!(name = %file.name, size, key = %key, "Attachment uploaded");

            fields.insert("file_url".to_string(), json!(url));
            fields.insert("file_name".to_string(), json!(file.name));
            fields.insert("file_size".to_string(), json!(size));
        }

        let row = self
            .backend
            .insert_record("messages", fields)
            .await
            .map_err(map_insert)?;
        let message = decode::<MessageRow>(row)?.into_message();

        self.state()?.messages.push(message.clone());

        info!(conversation = %conversation_id, message = %message.id, "Message sent");
        Ok(message)
    }

    /// Case-insensitive substring search on usernames, capped at
    /// [`SEARCH_LIMIT`] and excluding the current user.  An empty query
    /// returns no results.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Profile>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let self_id = self
            .backend
            .current_user()
            .await
            .map_err(map_query)?
            .map(|u| u.id);

        // One extra row so excluding self still fills the cap.
        let rows: Vec<ProfileRow> = decode_all(
            self.backend
                .query_records(
                    Query::new("profiles")
                        .filter(Filter::ilike("username", query))
                        .order(OrderBy::asc("username"))
                        .limit(SEARCH_LIMIT + 1),
                )
                .await
                .map_err(map_query)?,
        )?;

        let mut profiles: Vec<Profile> = rows
            .into_iter()
            .filter(|row| Some(row.id) != self_id)
            .map(ProfileRow::into_profile)
            .collect();
        profiles.truncate(SEARCH_LIMIT);
        Ok(profiles)
    }
}

/// Backend-assigned id of a freshly inserted record.
fn record_id(record: &Record) -> Result<Uuid> {
    record
        .get("id")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ClientError::Insert("record is missing an id".to_string()))
}

/// Randomized storage key keeping the original file extension.
fn storage_key(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", Uuid::new_v4(), ext)
        }
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use crate::testutil::{memory_backend, FailingInserts};
    use plume_backend::MemoryBackend;

    fn chat(backend: Arc<MemoryBackend>) -> ConversationManager {
        ConversationManager::new(backend, "message-files")
    }

    async fn sign_up(backend: &Arc<MemoryBackend>, username: &str) -> Profile {
        SessionManager::new(backend.clone())
            .sign_up(username, "secret1")
            .await
            .unwrap()
    }

    #[test]
    fn test_storage_key_keeps_extension() {
        assert!(storage_key("photo.png").ends_with(".png"));
        assert!(!storage_key("noext").contains('.'));
        assert!(!storage_key(".hidden").contains("hidden"));
        assert_ne!(storage_key("a.png"), storage_key("a.png"));
    }

    #[tokio::test]
    async fn test_create_conversation_requires_session() {
        let manager = chat(memory_backend());
        assert!(matches!(
            manager.create_conversation(ProfileId::new()).await.unwrap_err(),
            ClientError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn test_create_and_load_conversation() {
        let backend = memory_backend();
        let manager = chat(backend.clone());

        let b = sign_up(&backend, "bruno").await;
        let a = sign_up(&backend, "amira").await;

        manager.create_conversation(b.id).await.unwrap();

        let conversations = manager.conversations();
        assert_eq!(conversations.len(), 1);
        let mut usernames: Vec<&str> = conversations[0]
            .participants
            .iter()
            .map(|p| p.username.as_str())
            .collect();
        usernames.sort_unstable();
        assert_eq!(usernames, vec!["amira", "bruno"]);
        assert!(conversations[0].last_message.is_none());
        assert!(conversations[0].participants.iter().any(|p| p.id == a.id));
    }

    #[tokio::test]
    async fn test_create_conversation_rolls_back_on_link_failure() {
        let backend = memory_backend();
        sign_up(&backend, "amira").await;
        let failing = Arc::new(FailingInserts::new(
            backend.clone(),
            "conversation_participants",
        ));
        let manager = ConversationManager::new(failing, "message-files");

        assert!(matches!(
            manager.create_conversation(ProfileId::new()).await.unwrap_err(),
            ClientError::Insert(_)
        ));
        // Neither an orphaned conversation nor half a participant pair.
        assert!(backend.records("conversations").is_empty());
        assert!(backend.records("conversation_participants").is_empty());
        assert!(manager.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_requires_content_or_file() {
        let backend = memory_backend();
        sign_up(&backend, "amira").await;
        let manager = chat(backend.clone());

        assert!(matches!(
            manager
                .send_message(ConversationId::new(), "   ", None)
                .await
                .unwrap_err(),
            ClientError::EmptyMessage
        ));
        assert!(backend.records("messages").is_empty());
        assert!(manager.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_appends_after_confirmation() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;

        let conversation_id = manager.create_conversation(b.id).await.unwrap();
        manager
            .send_message(conversation_id, "bonjour", None)
            .await
            .unwrap();
        let sent = manager
            .send_message(conversation_id, "hello", None)
            .await
            .unwrap();

        // Incremental append preserves the prior message.
        let local = manager.messages();
        assert_eq!(local.len(), 2);
        assert_eq!(local[1], sent);

        manager.load_messages(conversation_id).await.unwrap();
        let loaded = manager.messages();
        assert_eq!(loaded.len(), 2);
        let last = loaded.last().unwrap();
        assert_eq!(last.content.as_deref(), Some("hello"));
        assert!(loaded.iter().all(|m| m.created_at <= last.created_at));
    }

    #[tokio::test]
    async fn test_send_message_with_file() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;
        let conversation_id = manager.create_conversation(b.id).await.unwrap();

        let sent = manager
            .send_message(
                conversation_id,
                "",
                Some(FileUpload {
                    name: "photo.png".to_string(),
                    bytes: vec![1, 2, 3],
                }),
            )
            .await
            .unwrap();

        assert!(sent.content.is_none());
        let attachment = sent.attachment.unwrap();
        assert_eq!(attachment.name, "photo.png");
        assert_eq!(attachment.size, 3);
        assert!(attachment.url.starts_with("memory://message-files/"));
        assert!(attachment.url.ends_with(".png"));

        // The bytes actually reached object storage.
        let path = attachment.url.trim_start_matches("memory://message-files/");
        assert_eq!(backend.object("message-files", path), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_last_message_summary_in_conversation_list() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;
        let conversation_id = manager.create_conversation(b.id).await.unwrap();

        manager
            .send_message(conversation_id, "first", None)
            .await
            .unwrap();
        manager
            .send_message(conversation_id, "second", None)
            .await
            .unwrap();

        manager.load_conversations().await.unwrap();
        let summary = manager.conversations()[0].last_message.clone().unwrap();
        assert_eq!(summary.content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_load_messages_is_idempotent() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;
        let conversation_id = manager.create_conversation(b.id).await.unwrap();
        manager
            .send_message(conversation_id, "hello", None)
            .await
            .unwrap();

        manager.load_messages(conversation_id).await.unwrap();
        let first = manager.messages();
        manager.load_messages(conversation_id).await.unwrap();
        assert_eq!(manager.messages(), first);
    }

    #[tokio::test]
    async fn test_select_conversation_clears_messages_on_deselect() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;
        let conversation_id = manager.create_conversation(b.id).await.unwrap();
        manager
            .send_message(conversation_id, "hello", None)
            .await
            .unwrap();

        let conversation = manager.conversations()[0].clone();
        manager.select_conversation(Some(conversation.clone())).unwrap();
        assert_eq!(manager.selected(), Some(conversation));

        manager.select_conversation(None).unwrap();
        assert!(manager.selected().is_none());
        assert!(manager.messages().is_empty());
    }

    #[tokio::test]
    async fn test_search_users_substring_case_insensitive() {
        let backend = memory_backend();
        for name in ["Alice", "aline", "bruno", "GHALI"] {
            sign_up(&backend, name).await;
        }
        sign_up(&backend, "caroline").await; // current user
        let manager = chat(backend);

        let found = manager.search_users("ali").await.unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["Alice", "GHALI", "aline"]);
    }

    #[tokio::test]
    async fn test_search_users_empty_query() {
        let backend = memory_backend();
        sign_up(&backend, "amira").await;
        let manager = chat(backend);
        assert!(manager.search_users("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_users_excludes_self_and_caps_results() {
        let backend = memory_backend();
        for i in 0..12 {
            sign_up(&backend, &format!("rivali-{:02}", i)).await;
        }
        // "-" sorts before the digits, so the current user lands inside the
        // fetched window and must be filtered out.
        sign_up(&backend, "rivali--self").await;
        let manager = chat(backend);

        let found = manager.search_users("rivali").await.unwrap();
        assert_eq!(found.len(), 10);
        assert!(found.iter().all(|p| p.username != "rivali--self"));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_prior_list() {
        let backend = memory_backend();
        let manager = chat(backend.clone());
        let b = sign_up(&backend, "bruno").await;
        sign_up(&backend, "amira").await;
        manager.create_conversation(b.id).await.unwrap();
        assert_eq!(manager.conversations().len(), 1);

        // Signed out: the reload fails and the prior list stays visible.
        backend.revoke_session().await.unwrap();
        assert!(matches!(
            manager.load_conversations().await.unwrap_err(),
            ClientError::NotAuthenticated
        ));
        assert_eq!(manager.conversations().len(), 1);
    }
}
