//! Wire shapes of backend records and their conversion into domain models.

use chrono::{DateTime, Utc};
use plume_backend::Record;
use plume_shared::{
    Attachment, ClientError, ConversationId, Message, MessageId, Profile, ProfileId,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

/// Row of the `profiles` collection.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProfileRow {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    /// Synthetic credential key.  Read during sign-in only, never shown.
    pub credential_key: Option<String>,
}

impl ProfileRow {
    pub fn into_profile(self) -> Profile {
        Profile {
            id: ProfileId(self.id),
            username: self.username,
            avatar_url: self.avatar_url,
        }
    }
}

/// Row of the `messages` collection.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let attachment = self.file_url.map(|url| Attachment {
            url,
            name: self.file_name.unwrap_or_default(),
            size: self.file_size.unwrap_or(0),
        });
        Message {
            id: MessageId(self.id),
            conversation_id: ConversationId(self.conversation_id),
            sender_id: ProfileId(self.sender_id),
            content: self.content,
            attachment,
            created_at: self.created_at,
        }
    }
}

/// Row of the `conversation_participants` collection.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ParticipantRow {
    pub conversation_id: Uuid,
    pub profile_id: Uuid,
}

/// Decode one backend record into a typed row.
pub(crate) fn decode<T: DeserializeOwned>(record: Record) -> Result<T, ClientError> {
    serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| ClientError::Query(format!("malformed record: {}", e)))
}

/// Decode a whole result set.
pub(crate) fn decode_all<T: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<T>, ClientError> {
    records.into_iter().map(decode).collect()
}
