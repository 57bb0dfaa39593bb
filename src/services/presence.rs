//! Connection tracking and typing-indicator debounce.
//!
//! A user may hold several simultaneous connections (multi-device,
//! multi-tab). The connection map and the typing-timer map are the only
//! long-lived mutable state in the process; both live in striped concurrent
//! maps so presence updates stay cheap under load.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::events::{TypingTarget, UserConnected, UserDisconnected, UserStoppedTyping};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypingKey {
    user_id: Uuid,
    target: TypingTarget,
}

struct TypingTimer {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct PresenceManager {
    connections: DashMap<Uuid, HashSet<Uuid>>,
    typing: Arc<DashMap<TypingKey, TypingTimer>>,
    typing_generation: AtomicU64,
    typing_timeout: Duration,
    bus: Arc<EventBus>,
}

impl PresenceManager {
    pub fn new(bus: Arc<EventBus>, typing_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            typing: Arc::new(DashMap::new()),
            typing_generation: AtomicU64::new(0),
            typing_timeout,
            bus,
        }
    }

    /// Register a connection for the user. `UserConnected` is published on
    /// every connection, not only the first; consumers wanting newly-online
    /// semantics must track set-size transitions themselves.
    pub async fn add_connection(&self, user_id: Uuid, connection_id: Uuid) {
        self.connections
            .entry(user_id)
            .or_default()
            .insert(connection_id);

        tracing::debug!(%user_id, %connection_id, "connection registered");
        self.bus
            .publish(UserConnected {
                user_id,
                connection_id,
            })
            .await;
    }

    /// Drop a connection. Returns true when this was the user's last
    /// connection; the removal and the emptiness check run under the shard
    /// lock so simultaneous disconnects cannot both claim it.
    pub async fn remove_connection(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let is_last = match self.connections.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().remove(&connection_id);
                if occupied.get().is_empty() {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        tracing::debug!(%user_id, %connection_id, is_last, "connection removed");
        self.bus
            .publish(UserDisconnected {
                user_id,
                connection_id,
                is_last_connection: is_last,
            })
            .await;
        is_last
    }

    /// Arm (or re-arm) the stopped-typing debounce for (user, target). The
    /// event fires once the quiet period elapses after the most recent
    /// signal; re-arming cancels and replaces the pending timer.
    pub fn set_typing_timeout(&self, user_id: Uuid, target: TypingTarget) {
        let key = TypingKey { user_id, target };
        let generation = self.typing_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.typing);
        let bus = Arc::clone(&self.bus);
        let delay = self.typing_timeout;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only the generation that armed this timer may fire it; a
            // replaced timer that escaped its abort finds a newer generation
            // here and stays silent.
            let fired = timers
                .remove_if(&key, |_, timer| timer.generation == generation)
                .is_some();
            if fired {
                bus.publish(UserStoppedTyping { user_id, target }).await;
            }
        });

        if let Some(previous) = self.typing.insert(key, TypingTimer { generation, task }) {
            previous.task.abort();
        }
    }

    /// Cancel every pending typing timer for the user, e.g. on disconnect.
    pub fn clear_typing_timeouts(&self, user_id: Uuid) {
        self.typing.retain(|key, timer| {
            if key.user_id == user_id {
                timer.task.abort();
                false
            } else {
                true
            }
        });
    }

    /// Snapshot of every user with at least one open connection.
    pub fn online_users(&self) -> Vec<Uuid> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections
            .get(&user_id)
            .map(|connections| !connections.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.connections
            .get(&user_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}
