//! PLU records and poll snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::network::probe::{ProbeOutcome, StatusReport};
use crate::topology::{Connections, Position};

/// A production line unit as tracked by the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Identity reported by the device itself
    pub id: u32,
    /// Address the device was last reached at
    pub ip: String,
    pub role_id: Option<u32>,
    /// Most recent battery level, 0..=100
    pub battery_level: u8,
    pub position: Option<Position>,
    /// Derived from positions; recomputed by the registry, never set directly
    pub connections: Connections,
    pub last_seen: DateTime<Utc>,
    /// Consecutive poll cycles this device was missing from
    #[serde(skip)]
    pub(crate) missed_polls: u32,
}

impl Device {
    pub(crate) fn from_observation(obs: &Observation, role_id: Option<u32>) -> Self {
        Self {
            id: obs.id,
            ip: obs.ip.clone(),
            role_id,
            battery_level: obs.battery_level,
            position: None,
            connections: Connections::default(),
            last_seen: Utc::now(),
            missed_polls: 0,
        }
    }
}

/// One device as seen by a single discovery cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub id: u32,
    pub ip: String,
    pub role_id: Option<u32>,
    pub battery_level: u8,
}

impl Observation {
    pub fn new(id: u32, ip: &str, role_id: Option<u32>, battery_level: u8) -> Self {
        Self {
            id,
            ip: ip.to_string(),
            role_id,
            battery_level,
        }
    }

    /// Build from a decoded status report; `None` if the battery is out of range.
    pub fn from_report(ip: &str, report: &StatusReport) -> Option<Self> {
        Some(Self::new(report.id, ip, report.role_id(), report.checked_battery()?))
    }
}

/// Everything one discovery cycle found reachable. Consumed by
/// [`DeviceRegistry::reconcile`](super::DeviceRegistry::reconcile).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    observations: Vec<Observation>,
}

impl PollSnapshot {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    /// Collect the reachable outcomes of a probe batch.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (String, ProbeOutcome)>,
    {
        let observations = outcomes
            .into_iter()
            .filter_map(|(ip, outcome)| match outcome {
                ProbeOutcome::Reachable(report) => Observation::from_report(&ip, &report),
                ProbeOutcome::Unreachable(_) => None,
            })
            .collect();
        Self { observations }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
