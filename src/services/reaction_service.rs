//! Reaction engine: one active reaction per user per message, aggregate
//! counts, and add/remove events.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::events::{MessageReactionAdded, MessageReactionRemoved};
use crate::models::reaction::{MessageReaction, MessageReactions, ReactionCount};
use crate::store::MessageStore;

pub struct ReactionService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    bus: Arc<EventBus>,
}

impl ReactionService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            directory,
            bus,
        }
    }

    /// React to a message. A second reaction with a different emoji replaces
    /// the user's previous one; repeating the same emoji is rejected.
    pub async fn add(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> AppResult<MessageReactions> {
        if emoji.is_empty() || emoji.len() > 20 {
            return Err(AppError::BadRequest("invalid emoji".into()));
        }
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.is_deleted {
            return Err(AppError::AlreadyDeleted);
        }

        if let Some(existing) = self.store.user_reaction(message_id, user_id).await? {
            if existing.emoji == emoji {
                return Err(AppError::DuplicateReaction {
                    emoji: emoji.to_string(),
                });
            }
            self.store
                .delete_reaction(message_id, user_id, &existing.emoji)
                .await?;
        }

        let reaction = MessageReaction {
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_reaction(&reaction).await.map_err(|err| {
            tracing::error!(%message_id, %user_id, error = %err, "failed to add reaction");
            err
        })?;

        let view = self.reactions(message_id, user_id).await?;
        let display_name = self
            .directory
            .user_profile(user_id)
            .await?
            .map(|profile| profile.display_name)
            .unwrap_or_default();

        tracing::debug!(%message_id, %user_id, emoji, "reaction added");
        self.bus
            .publish(MessageReactionAdded {
                message_id,
                user_id,
                display_name,
                emoji: emoji.to_string(),
                counts: count_map(&view.counts),
            })
            .await;
        Ok(view)
    }

    /// Remove the user's reaction. Fails with `NotFound` when the exact
    /// (message, user, emoji) row does not exist.
    pub async fn remove(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> AppResult<MessageReactions> {
        let removed = self
            .store
            .delete_reaction(message_id, user_id, emoji)
            .await?;
        if !removed {
            return Err(AppError::NotFound);
        }

        let view = self.reactions(message_id, user_id).await?;

        tracing::debug!(%message_id, %user_id, emoji, "reaction removed");
        self.bus
            .publish(MessageReactionRemoved {
                message_id,
                user_id,
                emoji: emoji.to_string(),
                counts: count_map(&view.counts),
            })
            .await;
        Ok(view)
    }

    /// Full reaction view: every reaction with reactor identity, the
    /// count-by-emoji aggregate, and the caller's own reactions.
    pub async fn reactions(&self, message_id: Uuid, user_id: Uuid) -> AppResult<MessageReactions> {
        let reactions = self.store.list_reactions(message_id).await?;
        let counts = self.store.reaction_counts(message_id).await?;
        let user_reactions = reactions
            .iter()
            .filter(|reaction| reaction.user_id == user_id)
            .map(|reaction| reaction.emoji.clone())
            .collect();

        Ok(MessageReactions {
            message_id,
            reactions,
            counts,
            user_reactions,
        })
    }

    /// Count-by-emoji aggregate only.
    pub async fn counts(&self, message_id: Uuid) -> AppResult<Vec<ReactionCount>> {
        self.store.reaction_counts(message_id).await
    }
}

fn count_map(counts: &[ReactionCount]) -> HashMap<String, i64> {
    counts
        .iter()
        .map(|entry| (entry.emoji.clone(), entry.count))
        .collect()
}
