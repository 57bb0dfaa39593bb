use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single user's reaction to a message. At most one row exists per
/// (message, user); reacting with a different emoji supersedes the old row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregated reaction count for one emoji.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: i64,
}

/// Full reaction view of a message: every reaction with reactor identity,
/// the count-by-emoji aggregate, and the calling user's own reactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReactions {
    pub message_id: Uuid,
    pub reactions: Vec<MessageReaction>,
    pub counts: Vec<ReactionCount>,
    pub user_reactions: Vec<String>,
}
