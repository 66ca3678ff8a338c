mod bus;
mod member;
mod storage;
mod zone;

use std::sync::{Arc, Mutex, atomic::AtomicBool, atomic::Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

pub use bus::{EventBus, EventKind, StoreEvent, Subscription};
pub use member::{NewTeamMember, TeamMember, TeamMemberUpdate};
pub use storage::{
    FileBackend, MemoryBackend, SaveError, SaveErrorKind, STORAGE_CAPACITY_BYTES, StorageBackend,
    entry_size_bytes,
};
pub use zone::{NewZone, Zone, ZoneUpdate};

/// Storage key the application document is persisted under.
pub const STORAGE_KEY: &str = "flyermap_data";

/// Quiet period collapsing a burst of mutations into one write.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// The whole application state, serialized as one JSON document. A
/// document missing either array reads as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppState {
    #[serde(default)]
    team_members: Vec<TeamMember>,
    #[serde(default)]
    zones: Vec<Zone>,
}

struct StoreState<B> {
    app: Mutex<AppState>,
    bus: EventBus,
    backend: B,
    storage_key: String,
    save_task: Mutex<Option<JoinHandle<()>>>,
    dirty: AtomicBool,
}

impl<B> std::fmt::Debug for StoreState<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreState")
            .field("storage_key", &self.storage_key)
            .field("dirty", &self.dirty.load(Ordering::SeqCst))
            .finish()
    }
}

/// Reactive container for team members and zones.
///
/// All mutation goes through the store: each method updates the state
/// under one internal lock, publishes a change event after the lock is
/// released, and restarts the debounced save timer. Cloning shares the
/// same state.
#[derive(Debug)]
pub struct Store<B: StorageBackend> {
    state: Arc<StoreState<B>>,
}

impl<B: StorageBackend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<B: StorageBackend> Store<B> {
    /// Open a store over the given backend, hydrating state persisted
    /// under [`STORAGE_KEY`]. A missing document starts empty; a
    /// malformed one is logged and discarded rather than failing the
    /// open.
    pub async fn open(backend: B) -> anyhow::Result<Self> {
        Self::open_with_key(backend, STORAGE_KEY).await
    }

    pub async fn open_with_key(backend: B, storage_key: &str) -> anyhow::Result<Self> {
        let hydrated = match backend.load(storage_key).await? {
            None => None,
            Some(raw) => match serde_json::from_str::<AppState>(&raw) {
                Ok(app) => Some(app),
                Err(err) => {
                    warn!(key = storage_key, error = %err, "discarding malformed document");
                    None
                }
            },
        };
        let had_document = hydrated.is_some();
        let store = Self {
            state: Arc::new(StoreState {
                app: Mutex::new(hydrated.unwrap_or_default()),
                bus: EventBus::new(),
                backend,
                storage_key: storage_key.to_string(),
                save_task: Mutex::new(None),
                dirty: AtomicBool::new(false),
            }),
        };
        if had_document {
            let (members, zones) = {
                let app = store.lock_app();
                (app.team_members.clone(), app.zones.clone())
            };
            store.state.bus.publish(&StoreEvent::TeamMembersLoaded(members));
            store.state.bus.publish(&StoreEvent::ZonesLoaded(zones));
        }
        Ok(store)
    }

    fn lock_app(&self) -> std::sync::MutexGuard<'_, AppState> {
        self.state.app.lock().expect("store state mutex poisoned")
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StoreEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.state.bus.subscribe(kind, handler)
    }

    /// Owned snapshot of the roster.
    pub fn team_members(&self) -> Vec<TeamMember> {
        self.lock_app().team_members.clone()
    }

    pub fn team_member(&self, id: &str) -> Option<TeamMember> {
        self.lock_app()
            .team_members
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Owned snapshot of the zones.
    pub fn zones(&self) -> Vec<Zone> {
        self.lock_app().zones.clone()
    }

    pub fn zone(&self, id: &str) -> Option<Zone> {
        self.lock_app().zones.iter().find(|z| z.id == id).cloned()
    }

    pub fn add_team_member(&self, new: NewTeamMember) -> TeamMember {
        let member = TeamMember {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            address: new.address,
            phone: new.phone,
            lat: new.lat,
            lng: new.lng,
            geocode_score: new.geocode_score,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            _guard: (),
        };
        self.lock_app().team_members.push(member.clone());
        self.state
            .bus
            .publish(&StoreEvent::TeamMemberAdded(member.clone()));
        self.schedule_save();
        member
    }

    pub fn update_team_member(&self, id: &str, update: TeamMemberUpdate) -> Option<TeamMember> {
        let updated = {
            let mut app = self.lock_app();
            let member = app.team_members.iter_mut().find(|m| m.id == id)?;
            if let Some(name) = update.name {
                member.name = name;
            }
            if let Some(address) = update.address {
                member.address = address;
            }
            if let Some(phone) = update.phone {
                member.phone = phone;
            }
            if let Some(lat) = update.lat {
                member.lat = lat;
            }
            if let Some(lng) = update.lng {
                member.lng = lng;
            }
            if let Some(score) = update.geocode_score {
                member.geocode_score = score;
            }
            member.updated_at = Some(OffsetDateTime::now_utc());
            member.clone()
        };
        self.state
            .bus
            .publish(&StoreEvent::TeamMemberUpdated(updated.clone()));
        self.schedule_save();
        Some(updated)
    }

    /// Remove a member from the roster. Zones keep whatever ids they
    /// reference; readers filter dangling ids against the roster.
    pub fn remove_team_member(&self, id: &str) -> bool {
        let removed = {
            let mut app = self.lock_app();
            let index = app.team_members.iter().position(|m| m.id == id);
            index.map(|i| app.team_members.remove(i))
        };
        match removed {
            Some(member) => {
                self.state
                    .bus
                    .publish(&StoreEvent::TeamMemberRemoved(member));
                self.schedule_save();
                true
            }
            None => false,
        }
    }

    pub fn add_zone(&self, new: NewZone) -> Zone {
        let zone = Zone {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            geojson: new.geojson,
            assigned_members: new.assigned_members,
            mailbox_count: None,
            notes: new.notes,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            _guard: (),
        };
        self.lock_app().zones.push(zone.clone());
        self.state.bus.publish(&StoreEvent::ZoneAdded(zone.clone()));
        self.schedule_save();
        zone
    }

    pub fn update_zone(&self, id: &str, update: ZoneUpdate) -> Option<Zone> {
        let updated = {
            let mut app = self.lock_app();
            let zone = app.zones.iter_mut().find(|z| z.id == id)?;
            if let Some(name) = update.name {
                zone.name = name;
            }
            if let Some(geojson) = update.geojson {
                zone.geojson = geojson;
            }
            if let Some(members) = update.assigned_members {
                zone.assigned_members = members;
            }
            if let Some(count) = update.mailbox_count {
                zone.mailbox_count = count;
            }
            if let Some(notes) = update.notes {
                zone.notes = notes;
            }
            zone.updated_at = Some(OffsetDateTime::now_utc());
            zone.clone()
        };
        self.state
            .bus
            .publish(&StoreEvent::ZoneUpdated(updated.clone()));
        self.schedule_save();
        Some(updated)
    }

    pub fn remove_zone(&self, id: &str) -> bool {
        let removed = {
            let mut app = self.lock_app();
            let index = app.zones.iter().position(|z| z.id == id);
            index.map(|i| app.zones.remove(i))
        };
        match removed {
            Some(zone) => {
                self.state.bus.publish(&StoreEvent::ZoneRemoved(zone));
                self.schedule_save();
                true
            }
            None => false,
        }
    }

    /// Replace the whole state, as an import does. Publishes the bulk
    /// loaded events rather than per-record additions.
    pub fn replace_all(&self, members: Vec<TeamMember>, zones: Vec<Zone>) {
        {
            let mut app = self.lock_app();
            app.team_members = members.clone();
            app.zones = zones.clone();
        }
        self.state
            .bus
            .publish(&StoreEvent::TeamMembersLoaded(members));
        self.state.bus.publish(&StoreEvent::ZonesLoaded(zones));
        self.schedule_save();
    }

    pub fn zone_count(&self) -> usize {
        self.lock_app().zones.len()
    }

    fn schedule_save(&self) {
        self.state.dirty.store(true, Ordering::SeqCst);
        let state = self.state.clone();
        let mut slot = self
            .state
            .save_task
            .lock()
            .expect("store save task mutex poisoned");
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            if let Err(err) = persist(&state).await {
                error!(error = %err, "debounced save failed");
            }
        }));
    }

    /// Cancel the pending save timer and write the current state now.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let pending = self
            .state
            .save_task
            .lock()
            .expect("store save task mutex poisoned")
            .take();
        if let Some(task) = pending {
            task.abort();
        }
        persist(&self.state).await?;
        Ok(())
    }
}

async fn persist<B: StorageBackend>(state: &StoreState<B>) -> Result<(), SaveError> {
    let document = {
        let app = state.app.lock().expect("store state mutex poisoned");
        serde_json::to_string(&*app).expect("application state serializes to JSON")
    };
    state.backend.save(&state.storage_key, &document).await?;
    state.dirty.store(false, Ordering::SeqCst);
    Ok(())
}

impl<B> Drop for StoreState<B> {
    fn drop(&mut self) {
        // A pending debounce task keeps this state alive through its
        // Arc, so reaching this point dirty means a save failed or the
        // runtime is shutting down before the timer fired.
        if self.dirty.load(Ordering::SeqCst) {
            warn!(
                key = %self.storage_key,
                "store dropped with unsaved changes; call flush() before teardown"
            );
        }
    }
}
