//! The control center context.
//!
//! Owns the role catalog, the device registry, the discovery poller and the
//! command dispatcher. Built once at startup and passed to whoever needs it.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ControlConfig};
use crate::network::{
    CommandDispatcher, CommandError, DeviceCommand, DiscoveryPoller, HttpProbe, LineState,
    LivenessProbe,
};
use crate::registry::{spawn_position_feed, DeviceRegistry, PositionReading, RegistryError};
use crate::roles::{discard_figure, RoleCatalog, RoleError};
use crate::topology::AxisChainPolicy;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roles(#[from] RoleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("HTTP client error: {0}")]
    Client(String),
}

pub struct ControlCenter {
    config: ControlConfig,
    roles: Arc<RwLock<RoleCatalog>>,
    registry: Arc<DeviceRegistry>,
    poller: Arc<DiscoveryPoller>,
    dispatcher: CommandDispatcher,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlCenter {
    /// Build the context from a configuration, loading the role catalog from
    /// `config.role_store`. A missing or unreadable catalog is an error.
    pub fn from_config(config: ControlConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let catalog = RoleCatalog::load(&config.role_store)?;
        let addresses = config.address_range()?.addresses();
        let probe = HttpProbe::new(&config.info_path, config.probe_timeout())
            .map_err(|e| ControlError::Client(e.to_string()))?;
        Self::with_probe(config, catalog, addresses, Arc::new(probe))
    }

    /// Build the context around an explicit address list and probe.
    pub fn with_probe(
        config: ControlConfig,
        catalog: RoleCatalog,
        addresses: Vec<String>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Result<Self, ControlError> {
        let dispatcher = CommandDispatcher::new(&config.config_path, config.probe_timeout())
            .map_err(|e| ControlError::Client(e.to_string()))?;

        let roles = Arc::new(RwLock::new(
            catalog.with_figure_dir(config.figure_dir.clone()),
        ));
        let registry = Arc::new(
            DeviceRegistry::new(
                Arc::clone(&roles),
                Arc::new(AxisChainPolicy::new(config.max_link_distance)),
            )
            .with_eviction_misses(config.eviction_misses),
        );
        let poller = DiscoveryPoller::new(
            addresses,
            probe,
            Arc::clone(&registry),
            config.poller_config(),
        );

        Ok(Self {
            config,
            roles,
            registry,
            poller,
            dispatcher,
            poll_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn roles(&self) -> &Arc<RwLock<RoleCatalog>> {
        &self.roles
    }

    pub fn poller(&self) -> &Arc<DiscoveryPoller> {
        &self.poller
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Start background discovery. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut task = self.poll_task.lock().await;
        if task.as_ref().map_or(false, |t| !t.is_finished()) {
            return;
        }
        *task = Some(self.poller.start());
    }

    /// Stop discovery and wait for the current cycle to finish.
    pub async fn shutdown(&self) {
        let task = self.poll_task.lock().await.take();
        if let Some(task) = task {
            self.poller.stop();
            if let Err(e) = task.await {
                log::warn!("Discovery task ended abnormally: {}", e);
            }
        }
    }

    /// Channel for an external position sensor. Readings are applied to the
    /// registry until every clone of the sender is dropped.
    pub fn position_feed(&self) -> mpsc::Sender<PositionReading> {
        let (tx, rx) = mpsc::channel(64);
        spawn_position_feed(Arc::clone(&self.registry), rx);
        tx
    }

    /// Broadcast a run state to every tracked PLU.
    pub async fn set_line_state(&self, state: LineState) -> JoinHandle<()> {
        let addresses = self.registry.addresses().await;
        log::info!("Setting line state {} on {} PLUs", state, addresses.len());
        self.dispatcher
            .broadcast(addresses, DeviceCommand::SetState(state))
    }

    /// Tell one PLU to take on a role. The registry picks up the new role on
    /// the next discovery cycle.
    pub async fn assign_role(&self, device_id: u32, role_id: u32) -> Result<(), ControlError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(RegistryError::UnknownDevice(device_id))?;
        let role = self
            .registry
            .resolve_role_name(role_id)
            .await
            .ok_or_else(|| RoleError::NotFound(format!("role {}", role_id)))?;

        let command = DeviceCommand::AssignRole { role, state: LineState::Stop };
        self.dispatcher.send(&device.ip, &command).await?;
        log::info!("Assigned role {} to PLU {}", role_id, device_id);
        Ok(())
    }

    // Role edits are applied to a copy of the catalog and only replace the
    // live one after the store has been written.

    /// Add a role and persist the catalog.
    pub async fn add_role(&self, name: &str) -> Result<u32, ControlError> {
        let mut roles = self.roles.write().await;
        let mut edited = roles.clone();
        let id = edited.add(name)?;
        edited.save()?;
        *roles = edited;
        Ok(id)
    }

    pub async fn rename_role(&self, id: u32, new_name: &str) -> Result<(), ControlError> {
        let mut roles = self.roles.write().await;
        let mut edited = roles.clone();
        edited.rename(id, new_name)?;
        edited.save()?;
        *roles = edited;
        Ok(())
    }

    /// Remove a role, persist, and detach it from every PLU that held it.
    /// Returns the affected PLU ids. On failure nothing changes.
    pub async fn remove_role(&self, id: u32) -> Result<Vec<u32>, ControlError> {
        let mut roles = self.roles.write().await;
        let mut edited = roles.clone();
        let removed = edited.remove(id)?;
        edited.save()?;
        *roles = edited;

        let cleared = self.registry.clear_role(id).await;
        drop(roles);
        discard_figure(&removed);
        log::info!("Removed role {} ({} PLUs cleared)", removed.name, cleared.len());
        Ok(cleared)
    }

    pub async fn import_role_figure(&self, id: u32, source: &Path) -> Result<(), ControlError> {
        let mut roles = self.roles.write().await;
        let mut edited = roles.clone();
        edited.import_figure(id, source)?;
        edited.save()?;
        *roles = edited;
        Ok(())
    }
}
