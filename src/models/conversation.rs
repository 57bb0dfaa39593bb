use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::GroupKind;
use crate::models::message::{Message, MessageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Institution,
    Class,
}

impl From<GroupKind> for ConversationKind {
    fn from(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Institution => ConversationKind::Institution,
            GroupKind::Class => ConversationKind::Class,
        }
    }
}

/// Addresses a conversation: the peer for direct threads, the group id
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationTarget {
    Direct(Uuid),
    Group(Uuid),
}

/// Denormalized preview of the newest message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
}

impl From<&Message> for MessageSummary {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            status: message.status,
            sent_at: message.sent_at,
        }
    }
}

/// A user-facing conversation entry. Computed fresh on every request,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// The other user's id for direct conversations, the group id otherwise.
    pub target_id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_message: Option<MessageSummary>,
    pub unread_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
    pub online_participants: Vec<Uuid>,
}

/// One page of conversation history, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub has_more: bool,
}
