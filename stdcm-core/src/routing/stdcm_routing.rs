use std::time::Instant;

use hashbrown::HashMap;
use log::{info, warn};
use serde::Serialize;

use super::search::{SearchOutcome, SearchPolicy, astar};
use super::stdcm::{LocationKey, StdcmGraph, StdcmNode};
use crate::algo::RemainingTimeEstimator;
use crate::error::Error;
use crate::infra::{BlockAvailability, BlockInfra, PhysicsProvider};
use crate::model::{StdcmConfig, StdcmRequest};
use crate::{BlockId, Distance, SPEED_EPSILON, Speed, TIME_EPSILON, Time};

/// One block traversal of the found path, with final times
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSection {
    pub block: BlockId,
    pub start_offset: Distance,
    pub end_offset: Distance,
    pub begin_time: Time,
    pub end_time: Time,
    pub entry_speed: Speed,
    pub exit_speed: Speed,
    pub added_delay: Time,
    pub waiting_time: Time,
    pub engineering_time: Time,
    pub allowance_speed_ratio: f64,
    /// Index of the next step once this section is done
    pub step_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StdcmPath {
    pub departure_time: Time,
    pub arrival_time: Time,
    /// How much later than the earliest possible time the train leaves
    pub total_departure_delay: Time,
    pub total_waiting_time: Time,
    pub sections: Vec<PathSection>,
}

impl StdcmPath {
    pub fn total_time(&self) -> Time {
        self.arrival_time - self.departure_time
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.sections.iter().map(|section| section.block)
    }

    /// Serializes the path to a JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Finds the earliest conflict-free path for `request`.
///
/// Returns `Ok(None)` when no path fits in the timetable before the search
/// horizon.
///
/// # Errors
///
/// Fails on an invalid request or configuration, and with
/// [`Error::SearchAborted`] when the search budget runs out.
pub fn find_stdcm_path(
    infra: &dyn BlockInfra,
    availability: &dyn BlockAvailability,
    physics: &dyn PhysicsProvider,
    request: &StdcmRequest,
    config: &StdcmConfig,
) -> Result<Option<StdcmPath>, Error> {
    let start = Instant::now();
    let mut graph = StdcmGraph::new(infra, availability, physics, request, config)?;
    let estimator = RemainingTimeEstimator::new(infra, request);
    let mut policy = StdcmSearchPolicy::new(&estimator, request.steps.len());

    let roots = graph.root_nodes();
    match astar(&mut graph, roots, &mut policy, &config.budget) {
        SearchOutcome::Found(destination) => {
            let path = resolve_path(&graph, &destination);
            info!(
                "Path found in {:?}: departure {:.0}s, arrival {:.0}s, {} sections, {} edges built",
                start.elapsed(),
                path.departure_time,
                path.arrival_time,
                path.sections.len(),
                graph.edges().len()
            );
            Ok(Some(path))
        }
        SearchOutcome::Exhausted { expansions } => {
            info!(
                "No path found after {expansions} expansions in {:?}",
                start.elapsed()
            );
            Ok(None)
        }
        SearchOutcome::Aborted { expansions } => {
            warn!(
                "Search aborted after {expansions} expansions in {:?}",
                start.elapsed()
            );
            Err(Error::SearchAborted { expansions })
        }
    }
}

/// Applies the final departure shift to every edge of the path
fn resolve_path(graph: &StdcmGraph<'_>, destination: &StdcmNode) -> StdcmPath {
    let edges = graph.edges();
    let final_delay = destination.total_delay_added;
    let ids = destination
        .previous_edge
        .map(|last| edges.path_to(last))
        .unwrap_or_default();

    let sections: Vec<PathSection> = ids
        .into_iter()
        .map(|id| {
            let edge = &edges[id];
            let offset = final_delay - edge.total_delay;
            PathSection {
                block: edge.block,
                start_offset: edge.start_offset(),
                end_offset: edge.end_offset(),
                begin_time: edge.begin_time + offset,
                end_time: edge.end_time() + offset,
                entry_speed: edge.entry_speed(),
                exit_speed: edge.exit_speed(),
                added_delay: edge.added_delay,
                waiting_time: edge.waiting_time,
                engineering_time: edge.engineering_time,
                allowance_speed_ratio: edge.allowance_speed_ratio,
                step_index: edge.step_index,
            }
        })
        .collect();

    let departure_time = sections.first().map_or(destination.time, |first| {
        first.begin_time - first.waiting_time
    });

    StdcmPath {
        departure_time,
        arrival_time: destination.time,
        total_departure_delay: final_delay,
        total_waiting_time: sections.iter().map(|section| section.waiting_time).sum(),
        sections,
    }
}

/// What a popped node brings: an earlier, faster or more flexible state
#[derive(Debug, Clone, Copy)]
struct Label {
    time: Time,
    speed: Speed,
    budget: Time,
}

impl Label {
    fn of(node: &StdcmNode) -> Self {
        Self {
            time: node.time,
            speed: node.speed,
            budget: node.max_added_delay_after,
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        self.time <= other.time + TIME_EPSILON
            && self.speed >= other.speed - SPEED_EPSILON
            && self.budget >= other.budget - TIME_EPSILON
    }
}

struct StdcmSearchPolicy<'h> {
    estimator: &'h RemainingTimeEstimator<'h>,
    step_count: usize,
    visited: HashMap<(LocationKey, usize), Vec<Label>>,
}

impl<'h> StdcmSearchPolicy<'h> {
    fn new(estimator: &'h RemainingTimeEstimator<'h>, step_count: usize) -> Self {
        Self {
            estimator,
            step_count,
            visited: HashMap::new(),
        }
    }
}

impl SearchPolicy<StdcmNode> for StdcmSearchPolicy<'_> {
    fn cost(&self, node: &StdcmNode) -> f64 {
        node.time
    }

    fn tie_break(&self, node: &StdcmNode) -> f64 {
        node.total_delay_added
    }

    fn heuristic(&self, node: &StdcmNode) -> f64 {
        self.estimator.estimate(node)
    }

    fn is_target(&self, node: &StdcmNode) -> bool {
        node.step_index >= self.step_count
    }

    fn should_skip(&mut self, node: &StdcmNode) -> bool {
        let label = Label::of(node);
        let labels = self
            .visited
            .entry((node.location_key(), node.step_index))
            .or_default();
        if labels.iter().any(|known| known.dominates(&label)) {
            return true;
        }
        labels.retain(|known| !label.dominates(known));
        labels.push(label);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_dominance() {
        let early = Label {
            time: 100.0,
            speed: 20.0,
            budget: 30.0,
        };
        let late = Label {
            time: 120.0,
            speed: 20.0,
            budget: 30.0,
        };
        let late_but_flexible = Label {
            time: 120.0,
            speed: 20.0,
            budget: 60.0,
        };
        assert!(early.dominates(&late));
        assert!(!late.dominates(&early));
        assert!(!early.dominates(&late_but_flexible));
        assert!(early.dominates(&early));
    }

    #[test]
    fn test_path_json() {
        let path = StdcmPath {
            departure_time: 60.0,
            arrival_time: 200.0,
            total_departure_delay: 60.0,
            total_waiting_time: 0.0,
            sections: Vec::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&path.to_json()).expect("valid json");
        assert_eq!(value["arrival_time"], 200.0);
        assert!((path.total_time() - 140.0).abs() < 1e-12);
    }
}
