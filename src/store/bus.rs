use std::sync::{Arc, Mutex, Weak, atomic::AtomicU64, atomic::Ordering};

use tracing::warn;

use crate::store::{member::TeamMember, zone::Zone};

/// Change notification published by the store. Payloads carry owned
/// snapshots of the affected records.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    TeamMemberAdded(TeamMember),
    TeamMemberUpdated(TeamMember),
    TeamMemberRemoved(TeamMember),
    TeamMembersLoaded(Vec<TeamMember>),
    ZoneAdded(Zone),
    ZoneUpdated(Zone),
    ZoneRemoved(Zone),
    ZonesLoaded(Vec<Zone>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TeamMemberAdded,
    TeamMemberUpdated,
    TeamMemberRemoved,
    TeamMembersLoaded,
    ZoneAdded,
    ZoneUpdated,
    ZoneRemoved,
    ZonesLoaded,
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StoreEvent::TeamMemberAdded(_) => EventKind::TeamMemberAdded,
            StoreEvent::TeamMemberUpdated(_) => EventKind::TeamMemberUpdated,
            StoreEvent::TeamMemberRemoved(_) => EventKind::TeamMemberRemoved,
            StoreEvent::TeamMembersLoaded(_) => EventKind::TeamMembersLoaded,
            StoreEvent::ZoneAdded(_) => EventKind::ZoneAdded,
            StoreEvent::ZoneUpdated(_) => EventKind::ZoneUpdated,
            StoreEvent::ZoneRemoved(_) => EventKind::ZoneRemoved,
            StoreEvent::ZonesLoaded(_) => EventKind::ZonesLoaded,
        }
    }
}

type Handler = Arc<dyn Fn(&StoreEvent) -> anyhow::Result<()> + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Publish/subscribe dispatcher for store events. Cloning shares the
/// subscriber registry.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<BusState>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .state
            .registrations
            .lock()
            .expect("bus registrations mutex poisoned")
            .len();
        f.debug_struct("EventBus").field("subscribers", &count).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. The handler stays active
    /// until the returned guard is dropped. Handlers for a kind run in
    /// subscription order.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StoreEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state
            .registrations
            .lock()
            .expect("bus registrations mutex poisoned")
            .push(Registration {
                id,
                kind,
                handler: Arc::new(handler),
            });
        Subscription {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    /// Deliver an event to every matching handler. A handler error is
    /// logged and does not stop delivery to later handlers or surface
    /// to the publisher.
    pub fn publish(&self, event: &StoreEvent) {
        // Snapshot first so handlers may subscribe or unsubscribe
        // while the event is being delivered.
        let handlers: Vec<Handler> = {
            let registrations = self
                .state
                .registrations
                .lock()
                .expect("bus registrations mutex poisoned");
            registrations
                .iter()
                .filter(|r| r.kind == event.kind())
                .map(|r| r.handler.clone())
                .collect()
        };
        for handler in handlers {
            if let Err(err) = handler(event) {
                warn!(kind = ?event.kind(), error = %err, "event handler failed");
            }
        }
    }
}

/// Active subscription; dropping it unsubscribes the handler.
pub struct Subscription {
    state: Weak<BusState>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut registrations = state
                .registrations
                .lock()
                .expect("bus registrations mutex poisoned");
            registrations.retain(|r| r.id != self.id);
        }
    }
}
