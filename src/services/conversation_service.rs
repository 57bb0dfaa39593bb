//! Builds the user-facing conversation list by merging the message store
//! with the directory and a presence snapshot. Conversations are derived
//! views; nothing here is persisted.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::models::conversation::{
    Conversation, ConversationKind, ConversationTarget, MessagePage, MessageSummary,
};
use crate::services::presence::PresenceManager;
use crate::store::{DirectSummary, HistoryQuery, MessageStore};

pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    presence: Arc<PresenceManager>,
    config: Arc<Config>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        presence: Arc<PresenceManager>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            directory,
            presence,
            config,
        }
    }

    /// All of the user's conversations, most recently active first.
    /// Conversations without any message yet sort last.
    pub async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut conversations = Vec::new();

        for summary in self.store.direct_summaries(user_id).await? {
            conversations.push(self.direct_conversation(summary).await?);
        }

        for group in self.directory.groups_for_user(user_id).await? {
            let last = self.store.latest_group_message(group.id).await?;
            let online = self.online_members(group.id).await?;
            conversations.push(Conversation {
                target_id: group.id,
                kind: ConversationKind::from(group.kind),
                name: Some(group.name),
                avatar_url: group.avatar_url,
                last_activity: last.as_ref().map(|m| m.sent_at),
                last_message: last.as_ref().map(MessageSummary::from),
                unread_count: 0,
                online_participants: online,
            });
        }

        // Descending by last activity; None orders below every Some
        conversations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(conversations)
    }

    /// A single conversation, built the same way as the list entries.
    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        target: ConversationTarget,
    ) -> AppResult<Conversation> {
        match target {
            ConversationTarget::Direct(peer_id) => {
                let profile = self
                    .directory
                    .user_profile(peer_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                let summary = self.store.direct_summary(user_id, peer_id).await?;
                Ok(Conversation {
                    target_id: peer_id,
                    kind: ConversationKind::Direct,
                    name: Some(profile.display_name),
                    avatar_url: profile.avatar_url,
                    last_activity: summary.as_ref().map(|s| s.last_message.sent_at),
                    last_message: summary.as_ref().map(|s| MessageSummary::from(&s.last_message)),
                    unread_count: summary.as_ref().map_or(0, |s| s.unread_count),
                    online_participants: self.online_of(&[peer_id]),
                })
            }
            ConversationTarget::Group(group_id) => {
                let group = self
                    .directory
                    .group(group_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                if !self
                    .directory
                    .can_access_group(user_id, group_id, group.kind)
                    .await?
                {
                    return Err(AppError::Forbidden);
                }
                let last = self.store.latest_group_message(group_id).await?;
                let online = self.online_members(group_id).await?;
                Ok(Conversation {
                    target_id: group_id,
                    kind: ConversationKind::from(group.kind),
                    name: Some(group.name),
                    avatar_url: group.avatar_url,
                    last_activity: last.as_ref().map(|m| m.sent_at),
                    last_message: last.as_ref().map(MessageSummary::from),
                    unread_count: 0,
                    online_participants: online,
                })
            }
        }
    }

    /// One page of conversation history, oldest first. Internally queried
    /// newest first so the `before` cursor walks backwards through history.
    pub async fn list_messages(
        &self,
        user_id: Uuid,
        target: ConversationTarget,
        page: i64,
        page_size: Option<i64>,
        before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> AppResult<MessagePage> {
        let page = page.max(1);
        let page_size = page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let query = HistoryQuery {
            before,
            limit: page_size,
            offset: (page - 1) * page_size,
        };

        let (mut messages, total) = match target {
            ConversationTarget::Direct(peer_id) => {
                // Scoped by the sender/recipient filter itself
                self.store.direct_history(user_id, peer_id, &query).await?
            }
            ConversationTarget::Group(group_id) => {
                let group = self
                    .directory
                    .group(group_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                if !self
                    .directory
                    .can_access_group(user_id, group_id, group.kind)
                    .await?
                {
                    tracing::warn!(%user_id, %group_id, "rejected history request from non-member");
                    return Err(AppError::Forbidden);
                }
                self.store.group_history(group_id, &query).await?
            }
        };

        messages.reverse();
        Ok(MessagePage {
            messages,
            page,
            page_size,
            total,
            has_more: total > page * page_size,
        })
    }

    async fn direct_conversation(&self, summary: DirectSummary) -> AppResult<Conversation> {
        let profile = self.directory.user_profile(summary.peer_id).await?;
        let (name, avatar_url) = match profile {
            Some(profile) => (Some(profile.display_name), profile.avatar_url),
            None => (None, None),
        };
        Ok(Conversation {
            target_id: summary.peer_id,
            kind: ConversationKind::Direct,
            name,
            avatar_url,
            last_activity: Some(summary.last_message.sent_at),
            last_message: Some(MessageSummary::from(&summary.last_message)),
            unread_count: summary.unread_count,
            online_participants: self.online_of(&[summary.peer_id]),
        })
    }

    async fn online_members(&self, group_id: Uuid) -> AppResult<Vec<Uuid>> {
        let members = self.directory.group_members(group_id).await?;
        Ok(self.online_of(&members))
    }

    fn online_of(&self, user_ids: &[Uuid]) -> Vec<Uuid> {
        user_ids
            .iter()
            .copied()
            .filter(|user_id| self.presence.is_online(*user_id))
            .collect()
    }
}
