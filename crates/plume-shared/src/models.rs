//! Domain model structs exchanged between the state containers and the UI.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer over IPC or kept in reactive state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, ProfileId};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A user's display identity, distinct from their authentication credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Unique profile identifier, equal to the backend auth user id.
    pub id: ProfileId,
    /// Unique human-chosen display name.
    pub username: String,
    /// Optional avatar image URL.
    pub avatar_url: Option<String>,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// File reference carried by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Public download URL of the stored object.
    pub url: String,
    /// Original file name as chosen by the sender.
    pub name: String,
    /// File size in bytes.
    pub size: i64,
}

/// A single chat message.  Immutable once created.
///
/// Invariant: `content` or `attachment` is present (enforced by the send
/// operation, which refuses a message with neither).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Profile id of the author.
    pub sender_id: ProfileId,
    /// Optional text content.
    pub content: Option<String>,
    /// Optional file reference.
    pub attachment: Option<Attachment>,
    /// Creation timestamp assigned by the backend at insert time.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A two-party messaging thread.
///
/// `participants` are read-only copies fetched from the backend, not live
/// references; they include the current user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Full profile records of every participant.
    pub participants: Vec<Profile>,
    /// Most recent message, if any message has been sent yet.
    pub last_message: Option<Message>,
}

/// An outgoing file handed to the send operation by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Original file name, used for display and to keep the extension.
    pub name: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}
