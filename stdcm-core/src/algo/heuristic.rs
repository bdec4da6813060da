use std::collections::BinaryHeap;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::infra::BlockInfra;
use crate::model::StdcmRequest;
use crate::routing::search::State;
use crate::routing::stdcm::{NodeLocation, StdcmNode};
use crate::{BlockId, DetectorId, Distance, Speed, Time};

/// Lower bound of the time left to reach the destination, for A*.
///
/// Distances are computed once per request, then divided by the maximum
/// speed of the train. Stops still to be made are added on top.
pub struct RemainingTimeEstimator<'a> {
    infra: &'a dyn BlockInfra,
    max_speed: Speed,
    /// `targets[k]`: locations of step `k`, with the distance still to run
    /// from there to the destination
    targets: Vec<Vec<(BlockId, Distance, Distance)>>,
    /// `distances[k]`: distance from each detector to the destination,
    /// going through steps `k..`
    distances: Vec<HashMap<DetectorId, Distance>>,
    /// `remaining_stops[k]`: dwell of the stops among steps `k..` except
    /// the destination
    remaining_stops: Vec<Time>,
}

impl<'a> RemainingTimeEstimator<'a> {
    pub fn new(infra: &'a dyn BlockInfra, request: &StdcmRequest) -> Self {
        let step_count = request.steps.len();
        let mut estimator = Self {
            infra,
            max_speed: request.rolling_stock.max_speed,
            targets: vec![Vec::new(); step_count],
            distances: vec![HashMap::new(); step_count],
            remaining_stops: vec![0.0; step_count + 1],
        };

        for k in (1..step_count).rev() {
            let mut seeds = Vec::new();
            for location in &request.steps[k].locations {
                let rest = if k + 1 < step_count {
                    estimator.distance_from(k + 1, location.block, location.offset)
                } else {
                    0.0
                };
                if rest.is_finite() {
                    estimator.targets[k].push((location.block, location.offset, rest));
                    seeds.push((infra.block_entry(location.block), location.offset + rest));
                }
            }
            estimator.distances[k] = backward_distances(infra, seeds);

            let dwell = if k + 1 < step_count {
                request.steps[k].stop_duration.unwrap_or(0.0)
            } else {
                0.0
            };
            estimator.remaining_stops[k] = estimator.remaining_stops[k + 1] + dwell;
        }

        estimator
    }

    /// Shortest distance from a position to the destination when step `k`
    /// is the next one, infinite when unreachable
    fn distance_from(&self, k: usize, block: BlockId, offset: Distance) -> Distance {
        let length = self.infra.block_length(block);
        let through_exit = self.distances[k]
            .get(&self.infra.block_exit(block))
            .map_or(f64::INFINITY, |distance| length - offset + distance);

        self.targets[k]
            .iter()
            .filter(|&&(target_block, target_offset, _)| {
                target_block == block && target_offset >= offset
            })
            .map(|&(_, target_offset, rest)| target_offset - offset + rest)
            .fold(through_exit, f64::min)
    }

    /// Seconds left at least, infinite when the destination cannot be
    /// reached from this node
    pub fn estimate(&self, node: &StdcmNode) -> Time {
        let k = node.step_index;
        if k >= self.distances.len() {
            return 0.0;
        }

        let distance = match node.location {
            NodeLocation::Detector(detector) => self.distances[k]
                .get(&detector)
                .copied()
                .unwrap_or(f64::INFINITY),
            NodeLocation::OnBlock { block, offset } => self.distance_from(k, block, offset),
        };
        if !distance.is_finite() {
            return f64::INFINITY;
        }

        distance / self.max_speed
            + self.remaining_stops[k]
            + node.stop_duration.unwrap_or(0.0)
    }
}

/// Dijkstra from the seeds, following blocks backwards
fn backward_distances(
    infra: &dyn BlockInfra,
    seeds: Vec<(DetectorId, Distance)>,
) -> HashMap<DetectorId, Distance> {
    let mut distances: HashMap<DetectorId, Distance> = HashMap::new();
    let mut heap = BinaryHeap::new();
    let mut sequence = 0;

    for (detector, cost) in seeds {
        if distances.get(&detector).is_some_and(|&best| best <= cost) {
            continue;
        }
        distances.insert(detector, cost);
        heap.push(State {
            cost,
            tie_break: 0.0,
            sequence,
            item: detector,
        });
        sequence += 1;
    }

    while let Some(State {
        cost,
        item: detector,
        ..
    }) = heap.pop()
    {
        // Skip if we've found a better path
        if distances.get(&detector).is_some_and(|&best| cost > best) {
            continue;
        }

        for block in infra.blocks_ending_at(detector) {
            let next = infra.block_entry(block);
            let next_cost = cost + infra.block_length(block);

            let improved = match distances.entry(next) {
                Entry::Vacant(entry) => {
                    entry.insert(next_cost);
                    true
                }
                Entry::Occupied(mut entry) if next_cost < *entry.get() => {
                    *entry.get_mut() = next_cost;
                    true
                }
                Entry::Occupied(_) => false,
            };
            if improved {
                heap.push(State {
                    cost: next_cost,
                    tie_break: 0.0,
                    sequence,
                    item: next,
                });
                sequence += 1;
            }
        }
    }

    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InMemoryInfra, InfraBuilder, SpeedSection};
    use crate::model::{RollingStock, StdcmStep, StepLocation};

    fn limits(length: f64) -> Vec<SpeedSection> {
        vec![SpeedSection {
            start: 0.0,
            end: length,
            speed: 40.0,
        }]
    }

    /// a -0-> b -1-> c -2-> d, plus a dead end b -3-> e
    fn line() -> InMemoryInfra {
        let mut builder = InfraBuilder::new();
        let a = builder.add_detector("a");
        let b = builder.add_detector("b");
        let c = builder.add_detector("c");
        let d = builder.add_detector("d");
        let e = builder.add_detector("e");
        builder.add_block("ab", a, b, 1000.0, limits(1000.0));
        builder.add_block("bc", b, c, 2000.0, limits(2000.0));
        builder.add_block("cd", c, d, 1000.0, limits(1000.0));
        builder.add_block("be", b, e, 500.0, limits(500.0));
        builder.build()
    }

    fn request(steps: Vec<StdcmStep>) -> StdcmRequest {
        let rolling_stock = RollingStock {
            name: "test".to_string(),
            max_speed: 40.0,
            acceleration: 0.5,
            deceleration: 0.5,
            auxiliary_power_share: 0.0,
        };
        StdcmRequest::new(rolling_stock, steps, 0.0, 3600.0)
    }

    fn at(block: BlockId, offset: Distance) -> Vec<StepLocation> {
        vec![StepLocation { block, offset }]
    }

    fn node(location: NodeLocation, step_index: usize) -> StdcmNode {
        StdcmNode {
            location,
            time: 0.0,
            speed: 0.0,
            total_delay_added: 0.0,
            max_added_delay_after: 0.0,
            step_index,
            previous_edge: None,
            stop_duration: None,
        }
    }

    #[test]
    fn test_estimate_along_line() {
        let infra = line();
        let request = request(vec![
            StdcmStep::passage(at(0, 0.0)),
            StdcmStep::passage(at(2, 600.0)),
        ]);
        let estimator = RemainingTimeEstimator::new(&infra, &request);

        let origin = node(NodeLocation::OnBlock { block: 0, offset: 0.0 }, 1);
        // 1000 + 2000 + 600 meters at 40 m/s
        assert!((estimator.estimate(&origin) - 90.0).abs() < 1e-9);

        let on_target_block = node(NodeLocation::OnBlock { block: 2, offset: 100.0 }, 1);
        assert!((estimator.estimate(&on_target_block) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_unreachable_is_infinite() {
        let infra = line();
        let request = request(vec![
            StdcmStep::passage(at(0, 0.0)),
            StdcmStep::passage(at(2, 600.0)),
        ]);
        let estimator = RemainingTimeEstimator::new(&infra, &request);

        let dead_end = node(NodeLocation::Detector(4), 1);
        assert!(estimator.estimate(&dead_end).is_infinite());
        let past_target = node(NodeLocation::OnBlock { block: 2, offset: 800.0 }, 1);
        assert!(estimator.estimate(&past_target).is_infinite());
    }

    #[test]
    fn test_intermediate_steps_and_stops() {
        let infra = line();
        let request = request(vec![
            StdcmStep::passage(at(0, 0.0)),
            StdcmStep::stop(at(1, 1000.0), 120.0),
            StdcmStep::passage(at(2, 1000.0)),
        ]);
        let estimator = RemainingTimeEstimator::new(&infra, &request);

        let origin = node(NodeLocation::OnBlock { block: 0, offset: 0.0 }, 1);
        // 4000 meters at 40 m/s plus the stop
        assert!((estimator.estimate(&origin) - 220.0).abs() < 1e-9);

        let mut stopped = node(NodeLocation::OnBlock { block: 1, offset: 1000.0 }, 2);
        stopped.stop_duration = Some(120.0);
        assert!((estimator.estimate(&stopped) - 170.0).abs() < 1e-9);

        let arrived = node(NodeLocation::Detector(3), 3);
        assert_eq!(estimator.estimate(&arrived), 0.0);
    }
}
