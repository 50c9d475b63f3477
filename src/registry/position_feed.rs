//! Position readings from an external sensor (the camera that watches the line).
//!
//! The sensor itself lives outside this crate; it only needs to push
//! [`PositionReading`]s into a channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{DeviceRegistry, RegistryError};
use crate::topology::Position;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionReading {
    pub id: u32,
    pub position: Position,
}

/// Apply readings to the registry until every sender is dropped.
/// Readings for devices the registry doesn't know are discarded.
pub fn spawn_position_feed(
    registry: Arc<DeviceRegistry>,
    mut readings: mpsc::Receiver<PositionReading>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(reading) = readings.recv().await {
            match registry
                .update_status(reading.id, None, Some(reading.position))
                .await
            {
                Ok(_) => {}
                Err(RegistryError::UnknownDevice(id)) => {
                    log::debug!("Position reading for untracked PLU {} dropped", id);
                }
                Err(e) => log::warn!("Position reading rejected: {}", e),
            }
        }
        log::debug!("Position feed closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Observation, PollSnapshot};
    use crate::roles::RoleCatalog;
    use crate::topology::AxisChainPolicy;
    use std::path::PathBuf;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_feed_applies_readings() {
        let registry = Arc::new(DeviceRegistry::new(
            Arc::new(RwLock::new(RoleCatalog::new(PathBuf::from("unused.db")))),
            Arc::new(AxisChainPolicy::default()),
        ));
        registry
            .reconcile(PollSnapshot::new(vec![
                Observation::new(1, "10.0.0.1", None, 90),
                Observation::new(2, "10.0.0.2", None, 90),
            ]))
            .await;

        let (tx, rx) = mpsc::channel(8);
        let feed = spawn_position_feed(Arc::clone(&registry), rx);

        tx.send(PositionReading { id: 1, position: Position::new(0.0, 0.0) }).await.unwrap();
        tx.send(PositionReading { id: 5, position: Position::new(9.0, 9.0) }).await.unwrap();
        tx.send(PositionReading { id: 2, position: Position::new(50.0, 0.0) }).await.unwrap();
        drop(tx);
        feed.await.unwrap();

        assert_eq!(registry.get(1).await.unwrap().position, Some(Position::new(0.0, 0.0)));
        assert!(registry.get(5).await.is_none());
        assert_eq!(registry.get(2).await.unwrap().connections.inputs, vec![1]);
    }
}
