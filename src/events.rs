//! Domain events published on the in-process bus.
//!
//! All events follow the "object.action" naming convention. Each struct
//! carries only the data its subscribers need; payloads are serde-friendly so
//! the transport layer can forward them verbatim.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::MessageType;

/// Marker for types that can travel over the [`crate::bus::EventBus`].
///
/// Subscribers match on the concrete Rust type; `event_type()` is the stable
/// wire name used for logging and downstream serialization.
pub trait Event: Any + Send + Sync + fmt::Debug {
    fn event_type(&self) -> &'static str;
}

/// Recipient of a typing indicator: a single user or a group thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingTarget {
    User(Uuid),
    Group(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSent {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Event for MessageSent {
    fn event_type(&self) -> &'static str {
        "message.sent"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEdited {
    pub message_id: Uuid,
    pub editor_id: Uuid,
    pub new_content: String,
    pub edited_at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Total number of edits applied to the message so far.
    pub edit_count: i64,
}

impl Event for MessageEdited {
    fn event_type(&self) -> &'static str {
        "message.edited"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub message_id: Uuid,
    pub deleted_by: Uuid,
    pub deleted_at: DateTime<Utc>,
    /// Distinguishes a tombstoned message from one physically removed.
    pub is_hard_delete: bool,
}

impl Event for MessageDeleted {
    fn event_type(&self) -> &'static str {
        "message.deleted"
    }
}

/// Batched read receipt. One event per mark-read call, carrying every
/// message the call actually transitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRead {
    pub message_ids: Vec<Uuid>,
    pub reader_id: Uuid,
    pub read_at: DateTime<Utc>,
}

impl Event for MessageRead {
    fn event_type(&self) -> &'static str {
        "message.read"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReactionAdded {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub emoji: String,
    pub counts: HashMap<String, i64>,
}

impl Event for MessageReactionAdded {
    fn event_type(&self) -> &'static str {
        "reaction.added"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReactionRemoved {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub counts: HashMap<String, i64>,
}

impl Event for MessageReactionRemoved {
    fn event_type(&self) -> &'static str {
        "reaction.removed"
    }
}

/// Published on every connection, including additional connections of an
/// already-online user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConnected {
    pub user_id: Uuid,
    pub connection_id: Uuid,
}

impl Event for UserConnected {
    fn event_type(&self) -> &'static str {
        "presence.connected"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDisconnected {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    /// True only when the user's last connection closed; the authoritative
    /// went-offline signal.
    pub is_last_connection: bool,
}

impl Event for UserDisconnected {
    fn event_type(&self) -> &'static str {
        "presence.disconnected"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStoppedTyping {
    pub user_id: Uuid,
    pub target: TypingTarget,
}

impl Event for UserStoppedTyping {
    fn event_type(&self) -> &'static str {
        "typing.stopped"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_naming() {
        let event = MessageSent {
            message_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            recipient_id: Some(Uuid::new_v4()),
            group_id: None,
            message_type: MessageType::Direct,
            content: "hello".into(),
            sent_at: Utc::now(),
        };

        assert_eq!(event.event_type(), "message.sent");
    }

    #[test]
    fn test_event_serialization() {
        let event = UserDisconnected {
            user_id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            is_last_connection: true,
        };

        let payload = serde_json::to_value(&event).unwrap();
        assert_eq!(payload["is_last_connection"], true);
        assert_eq!(payload["user_id"], event.user_id.to_string());
    }
}
