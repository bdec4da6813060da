use log::{debug, trace};

use super::delay::is_dominated;
use super::edge::{EdgeId, StdcmEdge};
use super::graph::StdcmGraph;
use super::node::StdcmNode;
use crate::model::{Envelope, TimeWindow};
use crate::{BlockId, Distance, POSITION_EPSILON, SPEED_EPSILON, TIME_EPSILON, Time};

/// Where an edge stops on its block
#[derive(Debug, Clone, Copy)]
struct Target {
    end_offset: Distance,
    reaches_step: bool,
    stop_duration: Option<Time>,
    time_window: Option<TimeWindow>,
}

/// Builds the edges leaving one node on one block, one per usable opening
/// of the block.
pub(crate) struct EdgeBuilder<'g, 'a> {
    graph: &'g mut StdcmGraph<'a>,
    node: StdcmNode,
    block: BlockId,
    start_offset: Distance,
}

impl<'g, 'a> EdgeBuilder<'g, 'a> {
    pub(crate) fn from_node(
        graph: &'g mut StdcmGraph<'a>,
        node: &StdcmNode,
        block: BlockId,
        start_offset: Distance,
    ) -> Self {
        Self {
            graph,
            node: node.clone(),
            block,
            start_offset,
        }
    }

    pub(crate) fn make_all_edges(mut self) -> Vec<EdgeId> {
        let target = self.target();
        let Some(envelope) = self.envelope_from_node(&target) else {
            return Vec::new();
        };

        let speed_ratio = self.graph.standard_allowance_speed_ratio(&envelope);
        let run_time = envelope.total_time() / speed_ratio;
        let dwell = self.node.stop_duration.unwrap_or(0.0);
        let delays = self.graph.delay_manager.minimum_delays_per_opening(
            self.block,
            self.node.time + dwell,
            dwell,
            run_time,
        );
        if delays.is_empty() {
            debug!(
                "No opening on block {} after {:.1}",
                self.block, self.node.time
            );
        }

        let mut built: Vec<EdgeId> = Vec::new();
        for delay in delays {
            let Some(edge) = self.build_with_delay(&target, &envelope, speed_ratio, delay) else {
                continue;
            };
            if built
                .iter()
                .any(|&other| is_dominated(&edge, &self.graph.edges[other]))
            {
                trace!(
                    "Edge on block {} with delay {delay:.1} is dominated",
                    self.block
                );
                continue;
            }
            built.push(self.graph.edges.push(edge));
        }
        built
    }

    /// The next pending step location on the block, or the block end
    fn target(&self) -> Target {
        let step = self.graph.request.steps.get(self.node.step_index);
        let step_offset = step.and_then(|step| {
            step.locations
                .iter()
                .filter(|location| {
                    location.block == self.block
                        && location.offset > self.start_offset + POSITION_EPSILON
                })
                .map(|location| location.offset)
                .min_by(f64::total_cmp)
        });

        match (step, step_offset) {
            (Some(step), Some(end_offset)) => Target {
                end_offset,
                reaches_step: true,
                stop_duration: step.stop_duration,
                time_window: step.time_window,
            },
            _ => Target {
                end_offset: self.graph.infra.block_length(self.block),
                reaches_step: false,
                stop_duration: None,
                time_window: None,
            },
        }
    }

    fn simulate(&self, target: &Target) -> Option<Envelope> {
        let max_exit_speed = target.stop_duration.map(|_| 0.0);
        self.graph
            .simulate(
                self.block,
                self.start_offset,
                target.end_offset,
                self.node.speed,
                max_exit_speed,
            )
            .inspect_err(|error| debug!("Simulation failed on block {}: {error}", self.block))
            .ok()
    }

    /// Envelope starting at the node speed, slowing the previous edges down
    /// when the block cannot be entered that fast
    fn envelope_from_node(&mut self, target: &Target) -> Option<Envelope> {
        let envelope = self.simulate(target)?;
        if envelope.begin_speed() >= self.node.speed - SPEED_EPSILON {
            return Some(envelope);
        }

        let Some(previous) = self.node.previous_edge else {
            debug!("Block {} cannot be entered from a standstill", self.block);
            return None;
        };
        let backtracking = self.graph.backtracking_manager;
        let repaired = backtracking.repair(self.graph, previous, envelope.begin_speed())?;
        self.node = self.graph.end_node(repaired);

        let envelope = self.simulate(target)?;
        (envelope.begin_speed() >= self.node.speed - SPEED_EPSILON).then_some(envelope)
    }

    /// Edge entering the block `delay` after the earliest possible time.
    ///
    /// The departure is shifted first. What the budget cannot cover is spent
    /// standing longer at the previous stop, or else running slower on the
    /// previous edge.
    fn build_with_delay(
        &mut self,
        target: &Target,
        envelope: &Envelope,
        speed_ratio: f64,
        delay: Time,
    ) -> Option<StdcmEdge> {
        let mut start = self.node.clone();
        let mut shift = delay.min(start.max_added_delay_after);

        let remaining = delay - shift;
        if remaining > TIME_EPSILON {
            let Some(previous) = start.previous_edge else {
                debug!(
                    "Departure cannot be shifted by {delay:.1}s to use block {}",
                    self.block
                );
                return None;
            };
            let held = match self.graph.hold_at_stop(previous, remaining, shift) {
                Some(held) => Ok(held),
                None => {
                    let allowance = self.graph.allowance_manager;
                    allowance.try_engineering_allowance(self.graph, previous, remaining, shift)
                }
            };
            match held {
                Ok(id) => start = self.graph.end_node(id),
                Err(shortfall) => {
                    debug!(
                        "{shortfall:.1}s of delay cannot be absorbed before block {}",
                        self.block
                    );
                    return None;
                }
            }
        }

        let waiting_time = start.stop_duration.unwrap_or(0.0);
        let mut edge = StdcmEdge {
            block: self.block,
            envelope: envelope.clone(),
            begin_time: start.time + waiting_time + shift,
            added_delay: shift,
            waiting_time,
            engineering_time: 0.0,
            allowance_speed_ratio: speed_ratio,
            total_delay: start.total_delay_added + shift,
            max_added_delay_after: 0.0,
            delay_before_conflict: 0.0,
            previous: start.previous_edge,
            step_index: start.step_index + usize::from(target.reaches_step),
            ends_on_step: target.reaches_step,
            stop_duration: target.stop_duration,
        };

        // Too early for the step window: leave later or stand longer
        if let Some(window) = target.time_window {
            let early = window.start - edge.end_time();
            if early > TIME_EPSILON {
                if shift + early <= start.max_added_delay_after + TIME_EPSILON {
                    shift += early;
                    edge.added_delay = shift;
                    edge.total_delay += early;
                } else if start.is_stop() {
                    edge.waiting_time += early;
                } else {
                    debug!(
                        "Arrival at step {} is {early:.1}s too early",
                        start.step_index
                    );
                    return None;
                }
                edge.begin_time += early;
            }
        }

        self.graph
            .validate_edge(edge, start.max_added_delay_after - shift)
    }
}
