//! In-memory message store for embedded use and tests. Process-local, no
//! durability; one write lock keeps every multi-step mutation atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::{Message, MessageEditHistory, MessageStatus, MessageType};
use crate::models::reaction::{MessageReaction, ReactionCount};

use super::{DirectSummary, EditCommand, HistoryQuery, MessageStore};

#[derive(Default)]
struct Tables {
    messages: HashMap<Uuid, Message>,
    edits: Vec<MessageEditHistory>,
    reactions: Vec<MessageReaction>,
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    tables: RwLock<Tables>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.sent_at.cmp(&a.sent_at).then_with(|| b.id.cmp(&a.id))
}

fn unread_by(message: &Message, user_id: Uuid) -> bool {
    message.recipient_id == Some(user_id)
        && message.status != MessageStatus::Read
        && !message.is_deleted
}

fn direct_between(message: &Message, user_id: Uuid, peer_id: Uuid) -> bool {
    message.message_type == MessageType::Direct
        && !message.is_deleted
        && ((message.sender_id == user_id && message.recipient_id == Some(peer_id))
            || (message.sender_id == peer_id && message.recipient_id == Some(user_id)))
}

fn paged(mut rows: Vec<Message>, query: &HistoryQuery) -> (Vec<Message>, i64) {
    rows.sort_by(newest_first);
    let total = rows.len() as i64;
    let start = (query.offset.max(0) as usize).min(rows.len());
    let end = (start + query.limit.max(0) as usize).min(rows.len());
    (rows[start..end].to_vec(), total)
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(&message_id).cloned())
    }

    async fn apply_edit(&self, command: EditCommand) -> AppResult<Message> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .get_mut(&command.message_id)
            .ok_or(AppError::NotFound)?;

        message.content = command.new_content.clone();
        if message.original_content.is_none() {
            message.original_content = command.original_content.clone();
        }
        message.edited_at = Some(command.edited_at);
        message.status = MessageStatus::Edited;
        let updated = message.clone();

        tables.edits.push(MessageEditHistory {
            id: Uuid::new_v4(),
            message_id: command.message_id,
            previous_content: command.previous_content,
            new_content: command.new_content,
            edited_at: command.edited_at,
            reason: command.reason,
        });

        Ok(updated)
    }

    async fn edit_count(&self, message_id: Uuid) -> AppResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .edits
            .iter()
            .filter(|entry| entry.message_id == message_id)
            .count() as i64)
    }

    async fn edit_history(&self, message_id: Uuid) -> AppResult<Vec<MessageEditHistory>> {
        let tables = self.tables.read().await;
        let mut history: Vec<MessageEditHistory> = tables
            .edits
            .iter()
            .filter(|entry| entry.message_id == message_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.edited_at.cmp(&a.edited_at));
        Ok(history)
    }

    async fn soft_delete(
        &self,
        message_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
        placeholder: &str,
    ) -> AppResult<Message> {
        let mut tables = self.tables.write().await;
        let message = tables.messages.get_mut(&message_id).ok_or(AppError::NotFound)?;

        message.is_deleted = true;
        message.deleted_at = Some(deleted_at);
        message.deleted_by = Some(deleted_by);
        message.content = placeholder.to_string();
        message.status = MessageStatus::Deleted;

        Ok(message.clone())
    }

    async fn hard_delete(&self, message_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.messages.remove(&message_id).is_none() {
            return Err(AppError::NotFound);
        }
        tables.edits.retain(|entry| entry.message_id != message_id);
        tables.reactions.retain(|r| r.message_id != message_id);
        // Replies keep their parent id dangling-free
        for message in tables.messages.values_mut() {
            if message.parent_message_id == Some(message_id) {
                message.parent_message_id = None;
            }
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        reader_id: Uuid,
        message_ids: &[Uuid],
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let mut tables = self.tables.write().await;
        let mut affected = Vec::new();
        for message_id in message_ids {
            if let Some(message) = tables.messages.get_mut(message_id) {
                if unread_by(message, reader_id) {
                    message.status = MessageStatus::Read;
                    if message.read_at.is_none() {
                        message.read_at = Some(read_at);
                    }
                    affected.push(*message_id);
                }
            }
        }
        Ok(affected)
    }

    async fn mark_delivered(
        &self,
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut tables = self.tables.write().await;
        let Some(message) = tables.messages.get_mut(&message_id) else {
            return Ok(None);
        };
        if message.status == MessageStatus::Sent && message.delivered_at.is_none() {
            message.status = MessageStatus::Delivered;
            message.delivered_at = Some(delivered_at);
        }
        Ok(Some(message.clone()))
    }

    async fn direct_summaries(&self, user_id: Uuid) -> AppResult<Vec<DirectSummary>> {
        let tables = self.tables.read().await;
        let mut latest: HashMap<Uuid, Message> = HashMap::new();
        let mut unread: HashMap<Uuid, i64> = HashMap::new();

        for message in tables.messages.values() {
            if message.message_type != MessageType::Direct || message.is_deleted {
                continue;
            }
            let Some(peer_id) = message.direct_peer(user_id) else {
                continue;
            };
            if message.sender_id != user_id && message.recipient_id != Some(user_id) {
                continue;
            }
            match latest.get(&peer_id) {
                Some(current) if newest_first(message, current).is_ge() => {}
                _ => {
                    latest.insert(peer_id, message.clone());
                }
            }
            if unread_by(message, user_id) {
                *unread.entry(peer_id).or_default() += 1;
            }
        }

        Ok(latest
            .into_iter()
            .map(|(peer_id, last_message)| DirectSummary {
                peer_id,
                unread_count: unread.get(&peer_id).copied().unwrap_or(0),
                last_message,
            })
            .collect())
    }

    async fn direct_summary(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
    ) -> AppResult<Option<DirectSummary>> {
        let tables = self.tables.read().await;
        let mut last: Option<Message> = None;
        let mut unread_count = 0;

        for message in tables.messages.values() {
            if !direct_between(message, user_id, peer_id) {
                continue;
            }
            match &last {
                Some(current) if newest_first(message, current).is_ge() => {}
                _ => last = Some(message.clone()),
            }
            if unread_by(message, user_id) {
                unread_count += 1;
            }
        }

        Ok(last.map(|last_message| DirectSummary {
            peer_id,
            last_message,
            unread_count,
        }))
    }

    async fn latest_group_message(&self, group_id: Uuid) -> AppResult<Option<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .values()
            .filter(|m| m.group_id == Some(group_id) && !m.is_deleted)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn direct_history(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)> {
        let tables = self.tables.read().await;
        let rows: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| direct_between(m, user_id, peer_id))
            .filter(|m| query.before.map_or(true, |cursor| m.sent_at < cursor))
            .cloned()
            .collect();
        Ok(paged(rows, query))
    }

    async fn group_history(
        &self,
        group_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)> {
        let tables = self.tables.read().await;
        let rows: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.group_id == Some(group_id) && !m.is_deleted)
            .filter(|m| query.before.map_or(true, |cursor| m.sent_at < cursor))
            .cloned()
            .collect();
        Ok(paged(rows, query))
    }

    async fn user_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<MessageReaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reactions
            .iter()
            .find(|r| r.message_id == message_id && r.user_id == user_id)
            .cloned())
    }

    async fn insert_reaction(&self, reaction: &MessageReaction) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        // Upsert on (message, user): the invariant's backstop
        tables
            .reactions
            .retain(|r| !(r.message_id == reaction.message_id && r.user_id == reaction.user_id));
        tables.reactions.push(reaction.clone());
        Ok(())
    }

    async fn delete_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.reactions.len();
        tables
            .reactions
            .retain(|r| !(r.message_id == message_id && r.user_id == user_id && r.emoji == emoji));
        Ok(tables.reactions.len() < before)
    }

    async fn list_reactions(&self, message_id: Uuid) -> AppResult<Vec<MessageReaction>> {
        let tables = self.tables.read().await;
        let mut reactions: Vec<MessageReaction> = tables
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        reactions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(reactions)
    }

    async fn reaction_counts(&self, message_id: Uuid) -> AppResult<Vec<ReactionCount>> {
        let tables = self.tables.read().await;
        let mut by_emoji: HashMap<String, i64> = HashMap::new();
        for reaction in tables.reactions.iter().filter(|r| r.message_id == message_id) {
            *by_emoji.entry(reaction.emoji.clone()).or_default() += 1;
        }
        let mut counts: Vec<ReactionCount> = by_emoji
            .into_iter()
            .map(|(emoji, count)| ReactionCount { emoji, count })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emoji.cmp(&b.emoji)));
        Ok(counts)
    }
}
