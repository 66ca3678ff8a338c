use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::geo::{GeoTransport, OverpassGateway};
use crate::models::{PolygonFeature, member_color};
use crate::store::{NewZone, StorageBackend, Store, Zone, ZoneUpdate};

/// Display style of an unassigned zone.
pub const UNASSIGNED_ZONE_STYLE: ZoneStyle = ZoneStyle {
    color: "#ef4444",
    weight: 2,
    fill_color: "#fca5a5",
    fill_opacity: 0.2,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneStyle {
    pub color: &'static str,
    pub weight: u32,
    pub fill_color: &'static str,
    pub fill_opacity: f64,
}

/// Detail edits never touch the geometry; geometry changes go through
/// [`ZoneLifecycle::geometry_edited`] so re-estimation is scheduled.
#[derive(Debug, Clone, Default)]
pub struct ZoneDetailsUpdate {
    pub name: Option<String>,
    pub assigned_members: Option<Vec<String>>,
    pub mailbox_count: Option<Option<u64>>,
    pub notes: Option<Option<String>>,
}

/// Orchestrates zone creation, editing and deletion against the store,
/// and keeps `mailbox_count` reconciled with the building count of the
/// current geometry.
///
/// Estimations run as background tasks and are never cancelled; when
/// several are in flight for one zone, whichever settles last writes
/// the count.
pub struct ZoneLifecycle<B: StorageBackend, T: GeoTransport> {
    store: Store<B>,
    gateway: Arc<OverpassGateway<T>>,
    pending: Arc<Mutex<HashMap<String, u32>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: StorageBackend, T: GeoTransport> ZoneLifecycle<B, T> {
    pub fn new(store: Store<B>, gateway: OverpassGateway<T>) -> Self {
        Self {
            store,
            gateway: Arc::new(gateway),
            pending: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    /// Finish an interactive draw: store the polygon as a zone and
    /// start its first estimation. A missing or blank name falls back
    /// to the next sequential `Zone N`.
    pub fn complete_draw(
        &self,
        geometry: PolygonFeature,
        name: Option<&str>,
    ) -> anyhow::Result<Zone> {
        anyhow::ensure!(geometry.is_polygon(), "zone geometry must be a polygon");
        let name = match name.map(str::trim) {
            Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
            _ => format!("Zone {}", self.store.zone_count() + 1),
        };
        let zone = self.store.add_zone(NewZone {
            name,
            geojson: geometry,
            assigned_members: Vec::new(),
            notes: None,
        });
        self.spawn_estimation(&zone);
        Ok(zone)
    }

    /// Apply an edited geometry and schedule a fresh estimation. An
    /// estimation already in flight still applies its result when it
    /// settles.
    pub fn geometry_edited(&self, id: &str, geometry: PolygonFeature) -> Option<Zone> {
        let zone = self.store.update_zone(
            id,
            ZoneUpdate {
                geojson: Some(geometry),
                ..ZoneUpdate::default()
            },
        )?;
        self.spawn_estimation(&zone);
        Some(zone)
    }

    /// Update name, assignments, manual count or notes. Returns the
    /// updated zone with its display style.
    pub fn edit_details(&self, id: &str, update: ZoneDetailsUpdate) -> Option<(Zone, ZoneStyle)> {
        let zone = self.store.update_zone(
            id,
            ZoneUpdate {
                name: update.name,
                geojson: None,
                assigned_members: update.assigned_members,
                mailbox_count: update.mailbox_count,
                notes: update.notes,
            },
        )?;
        let style = self.display_style(&zone);
        Some((zone, style))
    }

    /// Remove the zone. An estimation still in flight for it settles
    /// against a missing id and is discarded.
    pub fn delete(&self, id: &str) -> bool {
        self.store.remove_zone(id)
    }

    /// Schedule an estimation for the zone's current geometry.
    pub fn estimate(&self, id: &str) -> bool {
        match self.store.zone(id) {
            Some(zone) => {
                self.spawn_estimation(&zone);
                true
            }
            None => false,
        }
    }

    /// Style keyed off the first assigned member still on the roster,
    /// or the unassigned default.
    pub fn display_style(&self, zone: &Zone) -> ZoneStyle {
        let members = self.store.team_members();
        let assigned_index = zone.assigned_members.iter().find_map(|id| {
            members.iter().position(|m| &m.id == id)
        });
        match assigned_index {
            Some(index) => ZoneStyle {
                color: member_color(index),
                ..UNASSIGNED_ZONE_STYLE
            },
            None => UNASSIGNED_ZONE_STYLE,
        }
    }

    pub fn is_estimating(&self, id: &str) -> bool {
        self.pending
            .lock()
            .expect("estimation tracker mutex poisoned")
            .get(id)
            .is_some_and(|count| *count > 0)
    }

    /// Wait for every spawned estimation to settle.
    pub async fn settle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().expect("estimation tasks mutex poisoned");
                tasks.drain(..).collect()
            };
            if drained.is_empty() {
                return;
            }
            for task in drained {
                if let Err(err) = task.await {
                    if !err.is_cancelled() {
                        warn!(error = %err, "estimation task panicked");
                    }
                }
            }
        }
    }

    fn spawn_estimation(&self, zone: &Zone) {
        let zone_id = zone.id.clone();
        let geometry = zone.geojson.clone();
        let store = self.store.clone();
        let gateway = self.gateway.clone();
        let pending = self.pending.clone();

        *pending
            .lock()
            .expect("estimation tracker mutex poisoned")
            .entry(zone_id.clone())
            .or_insert(0) += 1;

        let task = tokio::spawn(async move {
            let result = gateway.count_buildings(&geometry).await;
            match result {
                Ok(count) => {
                    let applied = store.update_zone(
                        &zone_id,
                        ZoneUpdate {
                            mailbox_count: Some(Some(count)),
                            ..ZoneUpdate::default()
                        },
                    );
                    if applied.is_none() {
                        debug!(zone_id = %zone_id, "estimation settled after zone removal");
                    }
                }
                Err(err) => {
                    warn!(zone_id = %zone_id, error = %err, "mailbox estimation failed");
                }
            }
            let mut tracker = pending.lock().expect("estimation tracker mutex poisoned");
            if let Some(count) = tracker.get_mut(&zone_id) {
                *count -= 1;
                if *count == 0 {
                    tracker.remove(&zone_id);
                }
            }
        });
        self.tasks
            .lock()
            .expect("estimation tasks mutex poisoned")
            .push(task);
    }
}
