pub mod conversation;
pub mod message;
pub mod reaction;

// Re-export for convenience
pub use conversation::{Conversation, ConversationKind, ConversationTarget, MessagePage, MessageSummary};
pub use message::{Message, MessageEditHistory, MessageStatus, MessageType};
pub use reaction::{MessageReaction, MessageReactions, ReactionCount};
