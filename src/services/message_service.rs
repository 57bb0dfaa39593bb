//! Message lifecycle: creation, edit with audit trail, soft/hard deletion,
//! read receipts, and delivery stamping.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::Config;
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::events::{MessageDeleted, MessageEdited, MessageRead, MessageSent};
use crate::models::message::{Message, MessageEditHistory, MessageStatus, MessageType};
use crate::store::{EditCommand, MessageStore};

pub struct MessageService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    bus: Arc<EventBus>,
    config: Arc<Config>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        bus: Arc<EventBus>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            directory,
            bus,
            config,
        }
    }

    /// Send a message to a single recipient.
    pub async fn send_direct(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: String,
        parent_message_id: Option<Uuid>,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }
        self.directory
            .user_profile(recipient_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if let Some(parent_id) = parent_message_id {
            self.validate_parent(parent_id).await?;
        }

        let message = new_message(
            sender_id,
            Some(recipient_id),
            None,
            MessageType::Direct,
            content,
            parent_message_id,
        );
        self.store.insert_message(&message).await.map_err(|err| {
            tracing::error!(%sender_id, %recipient_id, error = %err, "failed to persist direct message");
            err
        })?;

        tracing::info!(message_id = %message.id, %sender_id, %recipient_id, "direct message sent");
        self.publish_sent(&message).await;
        Ok(message)
    }

    /// Send a message to an institution- or class-scoped group. The message
    /// type is derived from the group's kind.
    pub async fn send_group(
        &self,
        sender_id: Uuid,
        group_id: Uuid,
        content: String,
        parent_message_id: Option<Uuid>,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }
        let group = self
            .directory
            .group(group_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !self
            .directory
            .can_access_group(sender_id, group_id, group.kind)
            .await?
        {
            return Err(AppError::Forbidden);
        }
        if let Some(parent_id) = parent_message_id {
            self.validate_parent(parent_id).await?;
        }

        let message = new_message(
            sender_id,
            None,
            Some(group_id),
            MessageType::from(group.kind),
            content,
            parent_message_id,
        );
        self.store.insert_message(&message).await.map_err(|err| {
            tracing::error!(%sender_id, %group_id, error = %err, "failed to persist group message");
            err
        })?;

        tracing::info!(message_id = %message.id, %sender_id, %group_id, "group message sent");
        self.publish_sent(&message).await;
        Ok(message)
    }

    /// Edit a message's content. Only the original sender may edit, and
    /// tombstoned messages are immutable.
    pub async fn edit(
        &self,
        editor_id: Uuid,
        message_id: Uuid,
        new_content: String,
        reason: Option<String>,
    ) -> AppResult<Message> {
        if new_content.trim().is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id != editor_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Err(AppError::AlreadyDeleted);
        }

        let edited_at = Utc::now();
        let command = EditCommand {
            message_id,
            previous_content: message.content.clone(),
            new_content: new_content.clone(),
            original_content: if message.original_content.is_none() {
                Some(message.content.clone())
            } else {
                None
            },
            edited_at,
            reason: reason.clone(),
        };

        let updated = self.store.apply_edit(command).await.map_err(|err| {
            tracing::error!(%message_id, %editor_id, error = %err, "failed to apply edit");
            err
        })?;
        let edit_count = self.store.edit_count(message_id).await?;

        tracing::info!(%message_id, %editor_id, edit_count, "message edited");
        self.bus
            .publish(MessageEdited {
                message_id,
                editor_id,
                new_content,
                edited_at,
                reason,
                edit_count,
            })
            .await;
        Ok(updated)
    }

    /// Tombstone a message: deletion markers set and the content replaced
    /// with the configured placeholder. The row remains to keep reply
    /// threads intact.
    pub async fn soft_delete(&self, actor_id: Uuid, message_id: Uuid) -> AppResult<Message> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.authorize_delete(actor_id, &message).await?;
        if message.is_deleted {
            return Err(AppError::AlreadyDeleted);
        }

        let deleted_at = Utc::now();
        let updated = self
            .store
            .soft_delete(message_id, actor_id, deleted_at, &self.config.deleted_placeholder)
            .await
            .map_err(|err| {
                tracing::error!(%message_id, %actor_id, error = %err, "failed to delete message");
                err
            })?;

        tracing::info!(%message_id, %actor_id, "message soft-deleted");
        self.bus
            .publish(MessageDeleted {
                message_id,
                deleted_by: actor_id,
                deleted_at,
                is_hard_delete: false,
            })
            .await;
        Ok(updated)
    }

    /// Physically remove a message. Callers must gate this harder than soft
    /// deletion; it is meant for administrative cleanup.
    pub async fn hard_delete(&self, actor_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.authorize_delete(actor_id, &message).await?;

        let deleted_at = Utc::now();
        self.store.hard_delete(message_id).await.map_err(|err| {
            tracing::error!(%message_id, %actor_id, error = %err, "failed to hard-delete message");
            err
        })?;

        tracing::info!(%message_id, %actor_id, "message hard-deleted");
        self.bus
            .publish(MessageDeleted {
                message_id,
                deleted_by: actor_id,
                deleted_at,
                is_hard_delete: true,
            })
            .await;
        Ok(())
    }

    /// Mark a batch of messages read. Idempotent: only messages addressed to
    /// the reader and not already read are touched, and one event carries
    /// the whole batch. Returns the ids that actually changed.
    pub async fn mark_read(&self, reader_id: Uuid, message_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let read_at = Utc::now();
        let affected = self.store.mark_read(reader_id, message_ids, read_at).await?;

        if !affected.is_empty() {
            tracing::debug!(%reader_id, count = affected.len(), "messages marked read");
            self.bus
                .publish(MessageRead {
                    message_ids: affected.clone(),
                    reader_id,
                    read_at,
                })
                .await;
        }
        Ok(affected)
    }

    /// Record transport-confirmed receipt of a single message.
    pub async fn mark_delivered(&self, message_id: Uuid) -> AppResult<Message> {
        self.store
            .mark_delivered(message_id, Utc::now())
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Edit audit trail for a message, newest first.
    pub async fn edit_history(&self, message_id: Uuid) -> AppResult<Vec<MessageEditHistory>> {
        self.store.edit_history(message_id).await
    }

    async fn validate_parent(&self, parent_id: Uuid) -> AppResult<()> {
        let parent = self
            .store
            .get_message(parent_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if parent.is_deleted {
            return Err(AppError::BadRequest("cannot reply to a deleted message".into()));
        }
        Ok(())
    }

    async fn authorize_delete(&self, actor_id: Uuid, message: &Message) -> AppResult<()> {
        if message.sender_id == actor_id || self.directory.is_admin(actor_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    async fn publish_sent(&self, message: &Message) {
        self.bus
            .publish(MessageSent {
                message_id: message.id,
                sender_id: message.sender_id,
                recipient_id: message.recipient_id,
                group_id: message.group_id,
                message_type: message.message_type,
                content: message.content.clone(),
                sent_at: message.sent_at,
            })
            .await;
    }
}

fn new_message(
    sender_id: Uuid,
    recipient_id: Option<Uuid>,
    group_id: Option<Uuid>,
    message_type: MessageType,
    content: String,
    parent_message_id: Option<Uuid>,
) -> Message {
    Message {
        id: Uuid::new_v4(),
        sender_id,
        recipient_id,
        group_id,
        message_type,
        content,
        original_content: None,
        status: MessageStatus::Sent,
        sent_at: Utc::now(),
        delivered_at: None,
        read_at: None,
        edited_at: None,
        deleted_at: None,
        parent_message_id,
        is_deleted: false,
        deleted_by: None,
    }
}
