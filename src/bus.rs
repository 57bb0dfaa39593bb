//! In-process, type-keyed publish/subscribe hub.
//!
//! Publishing looks up handlers registered for the event's exact type, runs
//! each on its own task, and waits for all of them. A failing or panicking
//! handler is logged and never affects its siblings or the publisher. Events
//! with no subscribers are dropped; nothing survives a process restart.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::Event;

type AnyEvent = Arc<dyn std::any::Any + Send + Sync>;
type BoxedHandler = Arc<
    dyn Fn(AnyEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync,
>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    event_type: TypeId,
    id: Uuid,
}

struct Registration {
    id: Uuid,
    handler: BoxedHandler,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Registration>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of type `E`. Multiple handlers per type
    /// are allowed and invoked independently.
    pub async fn subscribe<E, F, Fut>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let wrapped: BoxedHandler = Arc::new(
            move |event: AnyEvent| -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> {
                match event.downcast::<E>() {
                    Ok(event) => Box::pin(handler(event)),
                    // Registry keys guarantee the concrete type; a mismatch
                    // means a skipped delivery, not a crash.
                    Err(_) => Box::pin(async { Ok(()) }),
                }
            },
        );

        let mut guard = self.handlers.write().await;
        guard
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Registration { id, handler: wrapped });

        tracing::debug!(event = std::any::type_name::<E>(), "handler subscribed");
        SubscriptionId {
            event_type: TypeId::of::<E>(),
            id,
        }
    }

    /// Remove a single registration; the type's handler list is pruned when
    /// it becomes empty.
    pub async fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut guard = self.handlers.write().await;
        if let Some(list) = guard.get_mut(&subscription.event_type) {
            list.retain(|registration| registration.id != subscription.id);
            if list.is_empty() {
                guard.remove(&subscription.event_type);
            }
        }
    }

    /// Deliver `event` to every handler registered for exactly `E`.
    ///
    /// Returns once all handlers have finished. Handler failures are caught
    /// and logged; publishing never fails.
    pub async fn publish<E: Event>(&self, event: E) {
        let event_type = event.event_type();

        let handlers: Vec<BoxedHandler> = {
            let guard = self.handlers.read().await;
            match guard.get(&TypeId::of::<E>()) {
                Some(list) => list
                    .iter()
                    .map(|registration| Arc::clone(&registration.handler))
                    .collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            tracing::debug!(event = event_type, "no subscribers for event");
            return;
        }

        let event: AnyEvent = Arc::new(event);
        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let event = Arc::clone(&event);
                tokio::spawn(async move { handler(event).await })
            })
            .collect();

        for result in join_all(tasks).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(event = event_type, error = %err, "event handler failed");
                }
                Err(err) => {
                    tracing::error!(event = event_type, error = %err, "event handler panicked");
                }
            }
        }
    }

    /// Number of handlers currently registered for `E`.
    pub async fn subscriber_count<E: Event>(&self) -> usize {
        let guard = self.handlers.read().await;
        guard.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone)]
    struct Ping(u32);

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "test.ping"
        }
    }

    #[derive(Debug, Clone)]
    struct Pong;

    impl Event for Pong {
        fn event_type(&self) -> &'static str {
            "test.pong"
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(Ping(1)).await;
    }

    #[tokio::test]
    async fn handlers_receive_only_their_event_type() {
        let bus = EventBus::new();
        let pings = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pings);
        bus.subscribe::<Ping, _, _>(move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.publish(Ping(7)).await;
        bus.publish(Pong).await;

        assert_eq!(pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_does_not_starve_siblings() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe::<Ping, _, _>(|_event| async move {
            anyhow::bail!("handler exploded")
        })
        .await;
        bus.subscribe::<Ping, _, _>(|_event| async move {
            None::<u32>.expect("handler panicked");
            Ok(())
        })
        .await;

        let counter = Arc::clone(&delivered);
        bus.subscribe::<Ping, _, _>(move |event| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(event.0, 42);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.publish(Ping(42)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_prunes_empty_handler_lists() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        let subscription = bus
            .subscribe::<Ping, _, _>(move |_event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        bus.publish(Ping(1)).await;
        bus.unsubscribe(subscription).await;
        bus.publish(Ping(2)).await;

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count::<Ping>().await, 0);
    }
}
