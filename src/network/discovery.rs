//! Periodic discovery of PLUs.
//!
//! Each cycle probes every address concurrently (at most `max_concurrent` in
//! flight), gathers the reachable ones into a [`PollSnapshot`] and hands the
//! whole snapshot to the registry in one call. The snapshot lists devices in
//! address order, whatever order the probes finished in. The address set is
//! fixed when the poller is built.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::probe::{LivenessProbe, ProbeOutcome};
use crate::registry::{DeviceRegistry, PollSnapshot, ReconcileSummary};

/// Configuration for the discovery loop.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub delay: Duration,
    /// Upper bound on probes in flight within one cycle.
    pub max_concurrent: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_concurrent: 32,
        }
    }
}

pub struct DiscoveryPoller {
    addresses: Vec<String>,
    probe: Arc<dyn LivenessProbe>,
    registry: Arc<DeviceRegistry>,
    config: PollerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl DiscoveryPoller {
    pub fn new(
        addresses: Vec<String>,
        probe: Arc<dyn LivenessProbe>,
        registry: Arc<DeviceRegistry>,
        config: PollerConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            addresses,
            probe,
            registry,
            config,
            shutdown_tx,
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Probe every address once and collect what answered.
    pub async fn poll_once(&self) -> PollSnapshot {
        let probe = &self.probe;
        let mut outcomes: Vec<(usize, String, ProbeOutcome)> =
            stream::iter(self.addresses.iter().cloned().enumerate())
                .map(|(index, address)| async move {
                    let outcome = probe.probe(&address).await;
                    (index, address, outcome)
                })
                .buffer_unordered(self.config.max_concurrent.max(1))
                .collect()
                .await;
        outcomes.sort_unstable_by_key(|(index, _, _)| *index);

        let snapshot = PollSnapshot::from_outcomes(
            outcomes
                .into_iter()
                .map(|(_, address, outcome)| (address, outcome)),
        );
        log::debug!(
            "Discovery cycle: {}/{} addresses reachable",
            snapshot.len(),
            self.addresses.len()
        );
        snapshot
    }

    /// One full cycle: poll, then reconcile the registry.
    pub async fn run_cycle(&self) -> ReconcileSummary {
        let snapshot = self.poll_once().await;
        self.registry.reconcile(snapshot).await
    }

    /// Spawn the discovery loop. It runs until [`stop`](Self::stop) is called;
    /// a stop requested mid-cycle takes effect once that cycle has finished.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        log::info!(
            "Discovery started over {} addresses, every {:?}",
            self.addresses.len(),
            self.config.delay
        );

        tokio::spawn(async move {
            loop {
                let summary = poller.run_cycle().await;
                if !summary.is_empty() {
                    log::debug!(
                        "Registry changed: {} added, {} updated, {} removed",
                        summary.added.len(),
                        summary.updated.len(),
                        summary.removed.len()
                    );
                }

                tokio::select! {
                    _ = tokio::time::sleep(poller.config.delay) => {}
                    _ = shutdown.recv() => break,
                }
            }
            log::info!("Discovery stopped");
        })
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
