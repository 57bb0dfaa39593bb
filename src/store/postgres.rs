//! Postgres-backed message store.
//!
//! Plain `query`/`bind` statements; rows are mapped by hand. Edits run in a
//! transaction so the row update and the history append land together.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::{Message, MessageEditHistory, MessageStatus, MessageType};
use crate::models::reaction::{MessageReaction, ReactionCount};

use super::{DirectSummary, EditCommand, HistoryQuery, MessageStore};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, group_id, message_type, content, \
     original_content, status, sent_at, delivered_at, read_at, edited_at, deleted_at, \
     parent_message_id, is_deleted, deleted_by";

#[derive(Clone)]
pub struct PgMessageStore {
    pool: Pool<Postgres>,
}

impl PgMessageStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(sqlx::Error::from(e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn message_from_row(row: &PgRow) -> AppResult<Message> {
    let message_type: String = row.try_get("message_type")?;
    let status: String = row.try_get("status")?;
    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        recipient_id: row.try_get("recipient_id")?,
        group_id: row.try_get("group_id")?,
        message_type: MessageType::parse(&message_type).ok_or(AppError::Internal)?,
        content: row.try_get("content")?,
        original_content: row.try_get("original_content")?,
        status: MessageStatus::parse(&status).ok_or(AppError::Internal)?,
        sent_at: row.try_get("sent_at")?,
        delivered_at: row.try_get("delivered_at")?,
        read_at: row.try_get("read_at")?,
        edited_at: row.try_get("edited_at")?,
        deleted_at: row.try_get("deleted_at")?,
        parent_message_id: row.try_get("parent_message_id")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_by: row.try_get("deleted_by")?,
    })
}

fn reaction_from_row(row: &PgRow) -> AppResult<MessageReaction> {
    Ok(MessageReaction {
        message_id: row.try_get("message_id")?,
        user_id: row.try_get("user_id")?,
        emoji: row.try_get("emoji")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, sender_id, recipient_id, group_id, message_type, content, \
             original_content, status, sent_at, delivered_at, read_at, edited_at, deleted_at, \
             parent_message_id, is_deleted, deleted_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(message.group_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(&message.original_content)
        .bind(message.status.as_str())
        .bind(message.sent_at)
        .bind(message.delivered_at)
        .bind(message.read_at)
        .bind(message.edited_at)
        .bind(message.deleted_at)
        .bind(message.parent_message_id)
        .bind(message.is_deleted)
        .bind(message.deleted_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn apply_edit(&self, command: EditCommand) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE messages SET content = $1, \
             original_content = COALESCE(original_content, $2), \
             edited_at = $3, status = 'edited' \
             WHERE id = $4 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(&command.new_content)
        .bind(&command.original_content)
        .bind(command.edited_at)
        .bind(command.message_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        sqlx::query(
            "INSERT INTO message_edit_history (id, message_id, previous_content, new_content, \
             edited_at, reason) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(command.message_id)
        .bind(&command.previous_content)
        .bind(&command.new_content)
        .bind(command.edited_at)
        .bind(&command.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        message_from_row(&row)
    }

    async fn edit_count(&self, message_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM message_edit_history WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn edit_history(&self, message_id: Uuid) -> AppResult<Vec<MessageEditHistory>> {
        let rows = sqlx::query(
            "SELECT id, message_id, previous_content, new_content, edited_at, reason \
             FROM message_edit_history WHERE message_id = $1 ORDER BY edited_at DESC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(MessageEditHistory {
                    id: row.try_get("id")?,
                    message_id: row.try_get("message_id")?,
                    previous_content: row.try_get("previous_content")?,
                    new_content: row.try_get("new_content")?,
                    edited_at: row.try_get("edited_at")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }

    async fn soft_delete(
        &self,
        message_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
        placeholder: &str,
    ) -> AppResult<Message> {
        let row = sqlx::query(&format!(
            "UPDATE messages SET is_deleted = TRUE, deleted_at = $2, deleted_by = $3, \
             content = $4, status = 'deleted' WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .bind(deleted_at)
        .bind(deleted_by)
        .bind(placeholder)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;
        message_from_row(&row)
    }

    async fn hard_delete(&self, message_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        reader_id: Uuid,
        message_ids: &[Uuid],
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "UPDATE messages SET status = 'read', read_at = COALESCE(read_at, $3) \
             WHERE id = ANY($1) AND recipient_id = $2 AND status <> 'read' \
             AND is_deleted = FALSE RETURNING id",
        )
        .bind(message_ids)
        .bind(reader_id)
        .bind(read_at)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(row.try_get("id")?))
            .collect()
    }

    async fn mark_delivered(
        &self,
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let updated = sqlx::query(&format!(
            "UPDATE messages SET status = 'delivered', delivered_at = $2 \
             WHERE id = $1 AND status = 'sent' AND delivered_at IS NULL \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .bind(delivered_at)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(Some(message_from_row(&row)?)),
            None => self.get_message(message_id).await,
        }
    }

    async fn direct_summaries(&self, user_id: Uuid) -> AppResult<Vec<DirectSummary>> {
        // 1. Newest message per peer
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT ON (peer_id) {MESSAGE_COLUMNS}, peer_id FROM ( \
               SELECT m.*, CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END AS peer_id \
               FROM messages m \
               WHERE m.message_type = 'direct' AND m.is_deleted = FALSE \
                 AND (m.sender_id = $1 OR m.recipient_id = $1) \
             ) t ORDER BY peer_id, sent_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        // 2. Unread counts per peer
        let unread_rows = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT sender_id, COUNT(*)::bigint FROM messages \
             WHERE message_type = 'direct' AND recipient_id = $1 \
               AND status <> 'read' AND is_deleted = FALSE \
             GROUP BY sender_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let unread: HashMap<Uuid, i64> = unread_rows.into_iter().collect();

        rows.into_iter()
            .map(|row| {
                let peer_id: Uuid = row.try_get("peer_id")?;
                Ok(DirectSummary {
                    peer_id,
                    last_message: message_from_row(&row)?,
                    unread_count: unread.get(&peer_id).copied().unwrap_or(0),
                })
            })
            .collect()
    }

    async fn direct_summary(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
    ) -> AppResult<Option<DirectSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE message_type = 'direct' AND is_deleted = FALSE \
               AND ((sender_id = $1 AND recipient_id = $2) \
                 OR (sender_id = $2 AND recipient_id = $1)) \
             ORDER BY sent_at DESC, id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let unread_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM messages \
             WHERE message_type = 'direct' AND recipient_id = $1 AND sender_id = $2 \
               AND status <> 'read' AND is_deleted = FALSE",
        )
        .bind(user_id)
        .bind(peer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(DirectSummary {
            peer_id,
            last_message: message_from_row(&row)?,
            unread_count,
        }))
    }

    async fn latest_group_message(&self, group_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE group_id = $1 AND is_deleted = FALSE \
             ORDER BY sent_at DESC, id DESC LIMIT 1"
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn direct_history(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)> {
        let filter = "message_type = 'direct' AND is_deleted = FALSE \
             AND ((sender_id = $1 AND recipient_id = $2) \
               OR (sender_id = $2 AND recipient_id = $1)) \
             AND sent_at < COALESCE($3, 'infinity'::timestamptz)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*)::bigint FROM messages WHERE {filter}"
        ))
        .bind(user_id)
        .bind(peer_id)
        .bind(query.before)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter} \
             ORDER BY sent_at DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(user_id)
        .bind(peer_id)
        .bind(query.before)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((messages, total))
    }

    async fn group_history(
        &self,
        group_id: Uuid,
        query: &HistoryQuery,
    ) -> AppResult<(Vec<Message>, i64)> {
        let filter = "group_id = $1 AND is_deleted = FALSE \
             AND sent_at < COALESCE($2, 'infinity'::timestamptz)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*)::bigint FROM messages WHERE {filter}"
        ))
        .bind(group_id)
        .bind(query.before)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter} \
             ORDER BY sent_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(group_id)
        .bind(query.before)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((messages, total))
    }

    async fn user_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<MessageReaction>> {
        let row = sqlx::query(
            "SELECT message_id, user_id, emoji, created_at FROM message_reactions \
             WHERE message_id = $1 AND user_id = $2",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(reaction_from_row).transpose()
    }

    async fn insert_reaction(&self, reaction: &MessageReaction) -> AppResult<()> {
        // The primary key on (message_id, user_id) is the backstop for the
        // one-reaction-per-user invariant under racing writers.
        sqlx::query(
            "INSERT INTO message_reactions (message_id, user_id, emoji, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (message_id, user_id) \
             DO UPDATE SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at",
        )
        .bind(reaction.message_id)
        .bind(reaction.user_id)
        .bind(&reaction.emoji)
        .bind(reaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM message_reactions \
             WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_reactions(&self, message_id: Uuid) -> AppResult<Vec<MessageReaction>> {
        let rows = sqlx::query(
            "SELECT message_id, user_id, emoji, created_at FROM message_reactions \
             WHERE message_id = $1 ORDER BY created_at ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reaction_from_row).collect()
    }

    async fn reaction_counts(&self, message_id: Uuid) -> AppResult<Vec<ReactionCount>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT emoji, COUNT(*)::bigint as count FROM message_reactions \
             WHERE message_id = $1 \
             GROUP BY emoji ORDER BY count DESC, emoji ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts
            .into_iter()
            .map(|(emoji, count)| ReactionCount { emoji, count })
            .collect())
    }
}
