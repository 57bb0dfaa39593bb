use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::GroupKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Direct,
    Institution,
    Class,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Direct => "direct",
            MessageType::Institution => "institution",
            MessageType::Class => "class",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(MessageType::Direct),
            "institution" => Some(MessageType::Institution),
            "class" => Some(MessageType::Class),
            _ => None,
        }
    }
}

impl From<GroupKind> for MessageType {
    fn from(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Institution => MessageType::Institution,
            GroupKind::Class => MessageType::Class,
        }
    }
}

/// Delivery status with edit/delete markers layered on top.
///
/// `Edited` and `Deleted` override the delivery state rather than extending
/// it; the nullable timestamps on [`Message`] remain the ground truth for
/// what has happened to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Edited,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Edited => "edited",
            MessageStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "edited" => Some(MessageStatus::Edited),
            "deleted" => Some(MessageStatus::Deleted),
            _ => None,
        }
    }
}

/// A direct or group message.
///
/// Exactly one of `recipient_id` / `group_id` is set: direct messages carry a
/// recipient, institution- and class-scoped messages carry a group id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    /// Content as originally sent, captured on the first edit only.
    pub original_content: Option<String>,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub parent_message_id: Option<Uuid>,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
}

impl Message {
    #[inline]
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        self.parent_message_id.is_some()
    }

    /// The other participant of a direct message, `None` for group messages.
    pub fn direct_peer(&self, user_id: Uuid) -> Option<Uuid> {
        match self.recipient_id {
            Some(recipient) if self.sender_id == user_id => Some(recipient),
            Some(_) => Some(self.sender_id),
            None => None,
        }
    }
}

/// Append-only audit record of a single edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEditHistory {
    pub id: Uuid,
    pub message_id: Uuid,
    pub previous_content: String,
    pub new_content: String,
    pub edited_at: DateTime<Utc>,
    pub reason: Option<String>,
}
