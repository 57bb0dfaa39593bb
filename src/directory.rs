//! Contract for the user/institution directory.
//!
//! The directory owns user and group data; this crate only resolves display
//! information, group membership, and privilege through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Institution,
    Class,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub kind: GroupKind,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a user's display name and avatar. `None` when the user does
    /// not exist.
    async fn user_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    /// All institution- and class-scoped groups the user belongs to.
    async fn groups_for_user(&self, user_id: Uuid) -> AppResult<Vec<Group>>;

    async fn group(&self, group_id: Uuid) -> AppResult<Option<Group>>;

    /// Membership ids of a group, used to compute online participants.
    async fn group_members(&self, group_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Whether the user may read from and post to the given group.
    async fn can_access_group(&self, user_id: Uuid, group_id: Uuid, kind: GroupKind)
        -> AppResult<bool>;

    /// Whether the user holds administrative privilege.
    async fn is_admin(&self, user_id: Uuid) -> AppResult<bool>;
}
