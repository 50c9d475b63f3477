//! Adjacency rules mapping positions to upstream/downstream links.

use std::cmp::Ordering;

use super::Position;

/// Rule deciding which positioned PLUs are linked.
///
/// Implementations must be pure: the same nodes must always give the same
/// links. Links are `(from, to)` pairs, `from` feeding `to`.
pub trait TopologyPolicy: Send + Sync {
    fn links(&self, nodes: &[(u32, Position)]) -> Vec<(u32, u32)>;
}

/// Orders PLUs along the line by `(x, y, id)` and links each one to the next
/// when they are at most `max_distance` apart.
#[derive(Clone, Debug)]
pub struct AxisChainPolicy {
    pub max_distance: f64,
}

impl AxisChainPolicy {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }
}

impl Default for AxisChainPolicy {
    fn default() -> Self {
        Self::new(150.0)
    }
}

fn line_order(a: &(u32, Position), b: &(u32, Position)) -> Ordering {
    a.1.x
        .total_cmp(&b.1.x)
        .then(a.1.y.total_cmp(&b.1.y))
        .then(a.0.cmp(&b.0))
}

impl TopologyPolicy for AxisChainPolicy {
    fn links(&self, nodes: &[(u32, Position)]) -> Vec<(u32, u32)> {
        let mut ordered = nodes.to_vec();
        ordered.sort_by(line_order);

        ordered
            .windows(2)
            .filter(|pair| pair[0].1.distance(&pair[1].1) <= self.max_distance)
            .map(|pair| (pair[0].0, pair[1].0))
            .collect()
    }
}
