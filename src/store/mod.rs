//! Message store contract and the adapters that implement it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::message::{Message, MessageEditHistory};
use crate::models::reaction::{MessageReaction, ReactionCount};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;

/// One direct-conversation row: the peer, the newest message exchanged with
/// them, and how many of their messages the user has not read yet.
#[derive(Debug, Clone)]
pub struct DirectSummary {
    pub peer_id: Uuid,
    pub last_message: Message,
    pub unread_count: i64,
}

/// A single edit applied atomically: the row update and the history append
/// must land together.
#[derive(Debug, Clone)]
pub struct EditCommand {
    pub message_id: Uuid,
    pub previous_content: String,
    pub new_content: String,
    /// `Some` on the first edit only; later edits leave the stored original
    /// untouched.
    pub original_content: Option<String>,
    pub edited_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Cursor + window for history queries. Rows come back newest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &Message) -> AppResult<()>;

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Applies one edit atomically: updates the row and appends the history
    /// entry. Returns the updated message.
    async fn apply_edit(&self, command: EditCommand) -> AppResult<Message>;

    async fn edit_count(&self, message_id: Uuid) -> AppResult<i64>;

    /// Edit audit trail, newest first.
    async fn edit_history(&self, message_id: Uuid) -> AppResult<Vec<MessageEditHistory>>;

    /// Tombstones the row: deletion markers set, content replaced with the
    /// placeholder. The row stays queryable by id.
    async fn soft_delete(
        &self,
        message_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
        placeholder: &str,
    ) -> AppResult<Message>;

    async fn hard_delete(&self, message_id: Uuid) -> AppResult<()>;

    /// Marks the given messages read for `reader_id` in one operation and
    /// returns the ids that actually changed. Messages not addressed to the
    /// reader, already read, or tombstoned are left untouched.
    async fn mark_read(
        &self,
        reader_id: Uuid,
        message_ids: &[Uuid],
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>>;

    /// Stamps `delivered_at` once; messages already delivered or further
    /// along are returned unchanged. `None` when the message does not exist.
    async fn mark_delivered(
        &self,
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;

    /// Every direct conversation touching the user, one entry per peer.
    async fn direct_summaries(&self, user_id: Uuid) -> AppResult<Vec<DirectSummary>>;

    /// Single-peer variant of [`MessageStore::direct_summaries`]. `None`
    /// when the two users have never exchanged messages.
    async fn direct_summary(&self, user_id: Uuid, peer_id: Uuid)
        -> AppResult<Option<DirectSummary>>;

    async fn latest_group_message(&self, group_id: Uuid) -> AppResult<Option<Message>>;

    /// Direct history between two users, newest first, with the total count
    /// matching the cursor filter.
    async fn direct_history(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)>;

    async fn group_history(
        &self,
        group_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)>;

    /// The user's current reaction on a message, if any. At most one exists.
    async fn user_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<MessageReaction>>;

    /// Inserts a reaction. The storage layer upserts on (message, user) as
    /// the backstop for the one-reaction-per-user invariant.
    async fn insert_reaction(&self, reaction: &MessageReaction) -> AppResult<()>;

    /// Returns whether the exact (message, user, emoji) row existed.
    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str)
        -> AppResult<bool>;

    async fn list_reactions(&self, message_id: Uuid) -> AppResult<Vec<MessageReaction>>;

    /// Count-by-emoji aggregate, highest count first.
    async fn reaction_counts(&self, message_id: Uuid) -> AppResult<Vec<ReactionCount>>;
}
