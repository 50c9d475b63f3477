//! Production line topology: which PLU feeds which.
//!
//! The topology is never stored as authoritative state. It is derived from
//! the current device positions every time membership or a position changes,
//! so the same positions always give the same graph.

pub mod policy;

pub use policy::{AxisChainPolicy, TopologyPolicy};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Planar coordinate of a PLU on the line.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Upstream and downstream neighbours of one PLU, both sorted by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

impl Connections {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

/// Device id -> connections. Every known device has an entry.
pub type Topology = BTreeMap<u32, Connections>;

/// Derive the topology for a set of `(id, position)` nodes.
///
/// Nodes without a position get empty connections. The policy only sees
/// positioned nodes, sorted by id; its links are normalized (self links
/// dropped, lists sorted and deduplicated) so the result does not depend on
/// input order.
pub fn derive<I>(nodes: I, policy: &dyn TopologyPolicy) -> Topology
where
    I: IntoIterator<Item = (u32, Option<Position>)>,
{
    let mut topology = Topology::new();
    let mut positioned: Vec<(u32, Position)> = Vec::new();

    for (id, position) in nodes {
        topology.entry(id).or_default();
        if let Some(position) = position {
            positioned.push((id, position));
        }
    }
    positioned.sort_by_key(|(id, _)| *id);
    positioned.dedup_by_key(|(id, _)| *id);

    for (from, to) in policy.links(&positioned) {
        if from == to || !topology.contains_key(&from) || !topology.contains_key(&to) {
            continue;
        }
        if let Some(conn) = topology.get_mut(&from) {
            conn.outputs.push(to);
        }
        if let Some(conn) = topology.get_mut(&to) {
            conn.inputs.push(from);
        }
    }

    for conn in topology.values_mut() {
        conn.inputs.sort_unstable();
        conn.inputs.dedup();
        conn.outputs.sort_unstable();
        conn.outputs.dedup();
    }
    topology
}
