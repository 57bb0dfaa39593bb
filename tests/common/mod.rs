#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Once, RwLock};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use campus_messaging::bus::EventBus;
use campus_messaging::config::Config;
use campus_messaging::directory::{Directory, Group, GroupKind, UserProfile};
use campus_messaging::error::AppResult;
use campus_messaging::events::Event;
use campus_messaging::services::{
    ConversationService, MessageService, PresenceManager, ReactionService,
};
use campus_messaging::store::{InMemoryMessageStore, MessageStore};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("campus_messaging=debug".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/campus_messaging_test".to_string(),
        typing_timeout_ms: 100,
        deleted_placeholder: "This message has been deleted".to_string(),
        default_page_size: 50,
        max_page_size: 200,
    }
}

/// In-memory directory fixture backing the `Directory` contract in tests.
#[derive(Default)]
pub struct TestDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
    groups: RwLock<HashMap<Uuid, Group>>,
    members: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
    admins: RwLock<HashSet<Uuid>>,
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, display_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users.write().unwrap().insert(
            id,
            UserProfile {
                id,
                display_name: display_name.to_string(),
                avatar_url: None,
            },
        );
        id
    }

    pub fn add_group(&self, name: &str, kind: GroupKind) -> Uuid {
        let id = Uuid::new_v4();
        self.groups.write().unwrap().insert(
            id,
            Group {
                id,
                kind,
                name: name.to_string(),
                avatar_url: None,
            },
        );
        id
    }

    pub fn add_member(&self, group_id: Uuid, user_id: Uuid) {
        self.members
            .write()
            .unwrap()
            .entry(group_id)
            .or_default()
            .insert(user_id);
    }

    pub fn make_admin(&self, user_id: Uuid) {
        self.admins.write().unwrap().insert(user_id);
    }
}

#[async_trait]
impl Directory for TestDirectory {
    async fn user_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.users.read().unwrap().get(&user_id).cloned())
    }

    async fn groups_for_user(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
        let members = self.members.read().unwrap();
        let groups = self.groups.read().unwrap();
        let mut result: Vec<Group> = members
            .iter()
            .filter(|(_, group_members)| group_members.contains(&user_id))
            .filter_map(|(group_id, _)| groups.get(group_id).cloned())
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn group(&self, group_id: Uuid) -> AppResult<Option<Group>> {
        Ok(self.groups.read().unwrap().get(&group_id).cloned())
    }

    async fn group_members(&self, group_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .members
            .read()
            .unwrap()
            .get(&group_id)
            .map(|group_members| group_members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn can_access_group(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        _kind: GroupKind,
    ) -> AppResult<bool> {
        Ok(self
            .members
            .read()
            .unwrap()
            .get(&group_id)
            .map(|group_members| group_members.contains(&user_id))
            .unwrap_or(false))
    }

    async fn is_admin(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.admins.read().unwrap().contains(&user_id))
    }
}

/// Fully wired service set over in-memory collaborators.
pub struct TestApp {
    pub store: Arc<InMemoryMessageStore>,
    pub directory: Arc<TestDirectory>,
    pub bus: Arc<EventBus>,
    pub presence: Arc<PresenceManager>,
    pub messages: MessageService,
    pub conversations: ConversationService,
    pub reactions: ReactionService,
}

impl TestApp {
    pub fn new() -> Self {
        setup_tracing();
        let config = Arc::new(test_config());
        let store = Arc::new(InMemoryMessageStore::new());
        let directory = Arc::new(TestDirectory::new());
        let bus = Arc::new(EventBus::new());
        let presence = Arc::new(PresenceManager::new(
            Arc::clone(&bus),
            config.typing_timeout(),
        ));

        let store_dyn: Arc<dyn MessageStore> = Arc::clone(&store) as Arc<dyn MessageStore>;
        let directory_dyn: Arc<dyn Directory> = Arc::clone(&directory) as Arc<dyn Directory>;

        let messages = MessageService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&directory_dyn),
            Arc::clone(&bus),
            Arc::clone(&config),
        );
        let conversations = ConversationService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&directory_dyn),
            Arc::clone(&presence),
            Arc::clone(&config),
        );
        let reactions = ReactionService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&directory_dyn),
            Arc::clone(&bus),
        );

        Self {
            store,
            directory,
            bus,
            presence,
            messages,
            conversations,
            reactions,
        }
    }
}

/// Subscribe a handler that records every published `E` for later assertions.
pub async fn capture<E>(bus: &EventBus) -> Arc<Mutex<Vec<E>>>
where
    E: Event + Clone,
{
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    bus.subscribe::<E, _, _>(move |event: Arc<E>| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().await.push((*event).clone());
            Ok(())
        }
    })
    .await;
    captured
}
