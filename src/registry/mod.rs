//! The device registry: the single owner of PLU state.
//!
//! Every mutation (poll reconciliation, status updates, removals) runs under
//! one write lock, and the derived topology is refreshed inside the same
//! critical section, so readers never observe a half-applied change.
//! Changes are announced on a broadcast channel for whatever view layer is
//! attached.

pub mod device;
pub mod position_feed;

pub use device::{Device, Observation, PollSnapshot};
pub use position_feed::{spawn_position_feed, PositionReading};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use crate::roles::RoleCatalog;
use crate::topology::{self, Position, Topology, TopologyPolicy};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown device: {0}")]
    UnknownDevice(u32),

    #[error("Battery level out of range: {0}")]
    InvalidBattery(u8),
}

/// Change notifications for the view layer.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryEvent {
    Added(Device),
    Updated(Device),
    Removed { id: u32 },
    TopologyChanged(Topology),
}

/// What one reconciliation changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<u32>,
    pub updated: Vec<u32>,
    pub removed: Vec<u32>,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

struct RegistryState {
    devices: BTreeMap<u32, Device>,
    topology: Topology,
}

pub struct DeviceRegistry {
    state: RwLock<RegistryState>,
    roles: Arc<RwLock<RoleCatalog>>,
    policy: Arc<dyn TopologyPolicy>,
    eviction_misses: u32,
    events: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create an empty registry. Devices are evicted after a single missed cycle.
    pub fn new(roles: Arc<RwLock<RoleCatalog>>, policy: Arc<dyn TopologyPolicy>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(RegistryState {
                devices: BTreeMap::new(),
                topology: Topology::new(),
            }),
            roles,
            policy,
            eviction_misses: 1,
            events,
        }
    }

    /// Evict a device only after `misses` consecutive cycles without it (minimum 1).
    pub fn with_eviction_misses(mut self, misses: u32) -> Self {
        self.eviction_misses = misses.max(1);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn roles(&self) -> &Arc<RwLock<RoleCatalog>> {
        &self.roles
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Recompute the topology from scratch and write connections back into
    /// the devices. Returns whether the graph changed.
    fn refresh_topology(&self, state: &mut RegistryState) -> bool {
        let derived = topology::derive(
            state.devices.values().map(|d| (d.id, d.position)),
            self.policy.as_ref(),
        );
        for (id, connections) in &derived {
            if let Some(device) = state.devices.get_mut(id) {
                device.connections = connections.clone();
            }
        }
        let changed = derived != state.topology;
        state.topology = derived;
        changed
    }

    /// Merge one poll snapshot: update devices seen before, insert new ones,
    /// and evict tracked devices the snapshot no longer contains.
    pub async fn reconcile(&self, snapshot: PollSnapshot) -> ReconcileSummary {
        let roles = self.roles.read().await;
        let mut state = self.state.write().await;
        let mut summary = ReconcileSummary::default();
        let mut observed = BTreeSet::new();
        let now = Utc::now();

        for obs in snapshot.observations() {
            if !observed.insert(obs.id) {
                log::warn!(
                    "PLU {} answered from more than one address in one cycle, ignoring {}",
                    obs.id,
                    obs.ip
                );
                continue;
            }

            let role_id = obs.role_id.filter(|id| roles.contains(*id));

            match state.devices.get_mut(&obs.id) {
                Some(device) => {
                    device.missed_polls = 0;
                    device.last_seen = now;
                    if device.ip != obs.ip
                        || device.role_id != role_id
                        || device.battery_level != obs.battery_level
                    {
                        if device.ip != obs.ip {
                            log::info!("PLU {} moved from {} to {}", obs.id, device.ip, obs.ip);
                        }
                        device.ip = obs.ip.clone();
                        device.role_id = role_id;
                        device.battery_level = obs.battery_level;
                        summary.updated.push(obs.id);
                    }
                }
                None => {
                    if role_id.is_none() {
                        if let Some(unknown) = obs.role_id {
                            log::warn!("PLU {} reports unknown role {}", obs.id, unknown);
                        }
                    }
                    log::info!(
                        "New PLU found: id={}, role={:?}, battery level={} at {}",
                        obs.id,
                        role_id,
                        obs.battery_level,
                        obs.ip
                    );
                    state.devices.insert(obs.id, Device::from_observation(obs, role_id));
                    summary.added.push(obs.id);
                }
            }
        }
        drop(roles);
        summary.added.sort_unstable();
        summary.updated.sort_unstable();

        let missing: Vec<u32> = state
            .devices
            .keys()
            .filter(|id| !observed.contains(*id))
            .copied()
            .collect();
        for id in missing {
            let evict = match state.devices.get_mut(&id) {
                Some(device) => {
                    device.missed_polls += 1;
                    device.missed_polls >= self.eviction_misses
                }
                None => false,
            };
            if evict {
                state.devices.remove(&id);
                log::info!("PLU {} no longer reachable, removed", id);
                summary.removed.push(id);
            }
        }

        let topology_changed = if summary.added.is_empty() && summary.removed.is_empty() {
            false
        } else {
            self.refresh_topology(&mut state)
        };

        for id in &summary.added {
            if let Some(device) = state.devices.get(id) {
                self.emit(RegistryEvent::Added(device.clone()));
            }
        }
        for id in &summary.updated {
            if let Some(device) = state.devices.get(id) {
                self.emit(RegistryEvent::Updated(device.clone()));
            }
        }
        for id in &summary.removed {
            self.emit(RegistryEvent::Removed { id: *id });
        }
        if topology_changed {
            self.emit(RegistryEvent::TopologyChanged(state.topology.clone()));
        }

        summary
    }

    pub async fn get(&self, id: u32) -> Option<Device> {
        self.state.read().await.devices.get(&id).cloned()
    }

    /// All devices, ordered by id.
    pub async fn devices(&self) -> Vec<Device> {
        self.state.read().await.devices.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.devices.is_empty()
    }

    /// Last known address of every tracked device.
    pub async fn addresses(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .devices
            .values()
            .map(|d| d.ip.clone())
            .collect()
    }

    pub async fn topology(&self) -> Topology {
        self.state.read().await.topology.clone()
    }

    /// Partially update a device. `None` leaves a field untouched; `Some(0)`
    /// is a real battery reading and is applied.
    pub async fn update_status(
        &self,
        id: u32,
        battery_level: Option<u8>,
        position: Option<Position>,
    ) -> Result<Device, RegistryError> {
        if let Some(level) = battery_level.filter(|level| *level > 100) {
            return Err(RegistryError::InvalidBattery(level));
        }

        let mut state = self.state.write().await;
        let device = state
            .devices
            .get_mut(&id)
            .ok_or(RegistryError::UnknownDevice(id))?;

        let mut changed = false;
        if let Some(level) = battery_level {
            changed |= device.battery_level != level;
            device.battery_level = level;
        }
        let mut moved = false;
        if let Some(position) = position {
            moved = device.position != Some(position);
            device.position = Some(position);
        }

        let topology_changed = moved && self.refresh_topology(&mut state);

        let device = state
            .devices
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownDevice(id))?;
        if changed || moved {
            self.emit(RegistryEvent::Updated(device.clone()));
        }
        if topology_changed {
            self.emit(RegistryEvent::TopologyChanged(state.topology.clone()));
        }
        Ok(device)
    }

    /// Remove a device. Removing an absent id is a no-op; returns whether
    /// anything was removed.
    pub async fn remove(&self, id: u32) -> bool {
        let mut state = self.state.write().await;
        if state.devices.remove(&id).is_none() {
            return false;
        }
        let topology_changed = self.refresh_topology(&mut state);
        self.emit(RegistryEvent::Removed { id });
        if topology_changed {
            self.emit(RegistryEvent::TopologyChanged(state.topology.clone()));
        }
        true
    }

    /// Drop references to a role that no longer exists. Returns the ids of
    /// the devices that were holding it.
    pub async fn clear_role(&self, role_id: u32) -> Vec<u32> {
        let mut state = self.state.write().await;
        let mut cleared = Vec::new();
        for device in state.devices.values_mut() {
            if device.role_id == Some(role_id) {
                device.role_id = None;
                cleared.push(device.id);
                self.emit(RegistryEvent::Updated(device.clone()));
            }
        }
        cleared
    }

    pub async fn resolve_role_name(&self, role_id: u32) -> Option<String> {
        self.roles.read().await.name_of(role_id).map(str::to_string)
    }

    pub async fn resolve_role_id(&self, name: &str) -> Option<u32> {
        self.roles.read().await.id_of(name)
    }
}
