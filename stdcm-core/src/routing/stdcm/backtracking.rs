use log::debug;

use super::edge::EdgeId;
use super::graph::StdcmGraph;
use super::node::quantize;
use crate::model::Envelope;
use crate::{SPEED_EPSILON, Speed};

/// Fixes speed discontinuities discovered while extending a path: when the
/// next block cannot be entered at the speed the previous edge ends with,
/// the previous edges are slowed down one after the other until the
/// required speed is reachable.
#[derive(Debug, Clone, Copy)]
pub struct BacktrackingManager {
    max_depth: usize,
}

impl BacktrackingManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// Returns a copy of `edge_id` ending at `max_exit_speed` at most, along
    /// with rebuilt copies of every upstream edge that had to change.
    ///
    /// The original edges are left untouched for the other branches using
    /// them. `None` when the chain reaches the origin still too fast, when
    /// it gets longer than the configured depth, or when a rebuilt edge no
    /// longer fits in the timetable. Repairing the same edge for the same
    /// speed twice returns the first copy.
    pub(crate) fn repair(
        &self,
        graph: &mut StdcmGraph<'_>,
        edge_id: EdgeId,
        max_exit_speed: Speed,
    ) -> Option<EdgeId> {
        let key = (edge_id, quantize(max_exit_speed));
        if let Some(&repaired) = graph.derived.repaired.get(&key) {
            return repaired;
        }
        let repaired = self.rebuild_chain(graph, edge_id, max_exit_speed);
        graph.derived.repaired.insert(key, repaired);
        repaired
    }

    fn rebuild_chain(
        &self,
        graph: &mut StdcmGraph<'_>,
        edge_id: EdgeId,
        max_exit_speed: Speed,
    ) -> Option<EdgeId> {
        // Downstream first
        let mut chain: Vec<(EdgeId, Envelope)> = Vec::new();
        let mut current = edge_id;
        let mut required = max_exit_speed;

        loop {
            if chain.len() >= self.max_depth {
                debug!(
                    "Backtracking gave up after {} edges to exit at {required:.2} m/s",
                    chain.len()
                );
                return None;
            }

            let edge = &graph.edges[current];
            let envelope = match graph.simulate(
                edge.block,
                edge.start_offset(),
                edge.end_offset(),
                edge.entry_speed(),
                Some(required),
            ) {
                Ok(envelope) => envelope,
                Err(error) => {
                    debug!("Cannot re-simulate block {}: {error}", edge.block);
                    return None;
                }
            };

            let begin_speed = envelope.begin_speed();
            let entry_speed = edge.entry_speed();
            let previous = edge.previous;
            chain.push((current, envelope));

            if begin_speed >= entry_speed - SPEED_EPSILON {
                break;
            }
            match previous {
                Some(previous) => {
                    current = previous;
                    required = begin_speed;
                }
                None => {
                    debug!("Train would need to start faster than {begin_speed:.2} m/s");
                    return None;
                }
            }
        }

        debug!("Rebuilding {} edges to reach {max_exit_speed:.2} m/s", chain.len());

        let mut rebuilt = None;
        for (old_id, envelope) in chain.into_iter().rev() {
            let old = graph.edges[old_id].clone();
            let start = match rebuilt {
                Some(previous) => graph.end_node(previous),
                None => graph.start_node(&old),
            };
            let Some(edge) = graph.rebuild_edge(&start, &old, envelope) else {
                debug!("Slowed edge on block {} conflicts", old.block);
                return None;
            };
            rebuilt = Some(graph.edges.push(edge));
        }
        rebuilt
    }
}
