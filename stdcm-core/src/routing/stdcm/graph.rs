use log::{debug, info};

use super::allowance::AllowanceManager;
use super::backtracking::BacktrackingManager;
use super::delay::DelayManager;
use super::edge::{DerivedEdges, EdgeArena, EdgeId, StdcmEdge};
use super::edge_builder::EdgeBuilder;
use super::node::{NodeLocation, StdcmNode, quantize};
use crate::error::{Error, SimulationError};
use crate::infra::{BlockAvailability, BlockInfra, PhysicsProvider, SimulationRequest};
use crate::model::{AllowanceValue, Envelope, StdcmConfig, StdcmRequest, TimeWindow};
use crate::routing::search::Graph;
use crate::{BlockId, Distance, POSITION_EPSILON, SPEED_EPSILON, Speed, TIME_EPSILON, Time};

/// Search graph of one STDCM request.
///
/// Nodes are train states at block boundaries or step locations, edges are
/// block traversals stored in the arena. The graph is built lazily by the
/// search engine through [`Graph::adjacent_edges`].
pub struct StdcmGraph<'a> {
    pub(crate) infra: &'a dyn BlockInfra,
    pub(crate) physics: &'a dyn PhysicsProvider,
    pub(crate) request: &'a StdcmRequest,
    pub(crate) edges: EdgeArena,
    pub(crate) derived: DerivedEdges,
    pub(crate) delay_manager: DelayManager<'a>,
    pub(crate) allowance_manager: AllowanceManager,
    pub(crate) backtracking_manager: BacktrackingManager,
}

impl<'a> StdcmGraph<'a> {
    /// Checks the request and sets up the managers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a flat-time standard allowance or
    /// a negative allowance, [`Error::InvalidBlock`] when a step refers to an
    /// unknown block and [`Error::InvalidRequest`] for any other malformed
    /// input.
    pub fn new(
        infra: &'a dyn BlockInfra,
        availability: &'a dyn BlockAvailability,
        physics: &'a dyn PhysicsProvider,
        request: &'a StdcmRequest,
        config: &StdcmConfig,
    ) -> Result<Self, Error> {
        validate_allowance(request.standard_allowance)?;
        validate_request(infra, request)?;

        info!(
            "STDCM graph for '{}': {} steps, departure from {:.0}s, at most {:.0}s of run time",
            request.rolling_stock.name,
            request.steps.len(),
            request.min_schedule_time_start,
            request.max_run_time
        );

        Ok(Self {
            infra,
            physics,
            request,
            edges: EdgeArena::new(),
            derived: DerivedEdges::default(),
            delay_manager: DelayManager::new(
                availability,
                request.search_horizon(),
                config.max_delay_openings,
            ),
            allowance_manager: AllowanceManager::new(request.standard_allowance, config),
            backtracking_manager: BacktrackingManager::new(config.max_backtracking_depth),
        })
    }

    pub fn edges(&self) -> &EdgeArena {
        &self.edges
    }

    pub fn request(&self) -> &StdcmRequest {
        self.request
    }

    /// `1 / (1 + allowance ratio)`, or 1 without standard allowance
    pub fn standard_allowance_speed_ratio(&self, envelope: &Envelope) -> f64 {
        self.allowance_manager.standard_allowance_speed_ratio(envelope)
    }

    /// One start node per origin location
    pub fn root_nodes(&self) -> Vec<StdcmNode> {
        let origin = &self.request.steps[0];
        let time = match origin.time_window {
            Some(window) => window.start.max(self.request.min_schedule_time_start),
            None => self.request.min_schedule_time_start,
        };
        let budget = self.root_delay_budget(time);
        if budget < 0.0 {
            debug!("Origin time window closes before the earliest departure");
            return Vec::new();
        }

        origin
            .locations
            .iter()
            .map(|location| StdcmNode {
                location: NodeLocation::OnBlock {
                    block: location.block,
                    offset: location.offset,
                },
                time,
                speed: 0.0,
                total_delay_added: 0.0,
                max_added_delay_after: budget,
                step_index: 1,
                previous_edge: None,
                stop_duration: None,
            })
            .collect()
    }

    /// How much a departure at `departure_time` can still be postponed
    pub(crate) fn root_delay_budget(&self, departure_time: Time) -> Time {
        let window_end = self.request.steps[0]
            .time_window
            .map_or(f64::INFINITY, |window| window.end);
        self.request
            .max_departure_delay()
            .min(window_end - departure_time)
    }

    /// Every step has been reached
    pub fn is_destination(&self, node: &StdcmNode) -> bool {
        node.step_index >= self.request.steps.len()
    }

    /// Node reached at the end of an edge
    pub fn end_node(&self, id: EdgeId) -> StdcmNode {
        let edge = &self.edges[id];
        let location = if edge.end_offset() >= self.infra.block_length(edge.block) - POSITION_EPSILON
        {
            NodeLocation::Detector(self.infra.block_exit(edge.block))
        } else {
            NodeLocation::OnBlock {
                block: edge.block,
                offset: edge.end_offset(),
            }
        };

        StdcmNode {
            location,
            time: edge.end_time(),
            speed: edge.exit_speed(),
            total_delay_added: edge.total_delay,
            max_added_delay_after: edge.max_added_delay_after,
            step_index: edge.step_index,
            previous_edge: Some(id),
            stop_duration: edge.stop_duration,
        }
    }

    /// Node an edge was built from: the end of its predecessor, or the
    /// origin for the first edge of a path
    pub(crate) fn start_node(&self, edge: &StdcmEdge) -> StdcmNode {
        match edge.previous {
            Some(previous) => self.end_node(previous),
            None => {
                let time = edge.begin_time - edge.waiting_time - edge.added_delay;
                StdcmNode {
                    location: NodeLocation::OnBlock {
                        block: edge.block,
                        offset: edge.start_offset(),
                    },
                    time,
                    speed: 0.0,
                    total_delay_added: 0.0,
                    max_added_delay_after: self.root_delay_budget(time),
                    step_index: 1,
                    previous_edge: None,
                    stop_duration: None,
                }
            }
        }
    }

    /// Time window of the step an edge ends on, if any
    pub(crate) fn arrival_window(&self, edge: &StdcmEdge) -> Option<TimeWindow> {
        if !edge.ends_on_step {
            return None;
        }
        self.request.steps[edge.step_index - 1].time_window
    }

    /// How much later the edge may arrive before missing its step window
    pub(crate) fn arrival_slack(&self, edge: &StdcmEdge) -> Time {
        self.arrival_window(edge)
            .map_or(f64::INFINITY, |window| window.end - edge.end_time())
    }

    pub(crate) fn simulate(
        &self,
        block: BlockId,
        start_offset: Distance,
        end_offset: Distance,
        entry_speed: Speed,
        max_exit_speed: Option<Speed>,
    ) -> Result<Envelope, SimulationError> {
        let speed_limits = self
            .infra
            .speed_limits(block, self.request.tag.as_deref());
        self.physics.simulate(&SimulationRequest {
            entry_speed,
            block_length: self.infra.block_length(block),
            start_offset,
            end_offset,
            speed_limits: &speed_limits,
            rolling_stock: &self.request.rolling_stock,
            comfort: self.request.comfort,
            max_exit_speed,
            time_step: self.request.time_step,
        })
    }

    /// Checks an edge against the horizon, its step window and the block
    /// availability, then sets its conflict slack and delay budget.
    ///
    /// `budget_left` is what the path before the edge still tolerates once
    /// the edge's own departure shift is taken.
    pub(crate) fn validate_edge(
        &self,
        mut edge: StdcmEdge,
        budget_left: Time,
    ) -> Option<StdcmEdge> {
        let end_time = edge.end_time();
        let horizon = self.delay_manager.horizon();
        if end_time > horizon + TIME_EPSILON {
            debug!(
                "Block {} left at {end_time:.1}, after the horizon {horizon:.1}",
                edge.block
            );
            return None;
        }

        if let Some(window) = self.arrival_window(&edge) {
            if !window.contains(end_time) {
                debug!(
                    "Step {} reached at {end_time:.1}, outside [{:.1}, {:.1}]",
                    edge.step_index - 1,
                    window.start,
                    window.end
                );
                return None;
            }
        }

        let Some(slack) = self.delay_manager.delay_before_conflict(
            edge.block,
            edge.occupancy_start(),
            edge.occupancy_duration(),
        ) else {
            debug!(
                "Block {} is not free from {:.1} to {end_time:.1}",
                edge.block,
                edge.occupancy_start()
            );
            return None;
        };

        let budget = budget_left
            .min(slack)
            .min(horizon - end_time)
            .min(self.arrival_slack(&edge));
        if budget < -TIME_EPSILON {
            return None;
        }
        edge.delay_before_conflict = slack;
        edge.max_added_delay_after = budget.max(0.0);
        Some(edge)
    }

    /// Copy of the edge leaving a stop, departing `extra_time` later.
    ///
    /// `None` when the edge does not leave a stop or when its block, step
    /// window or delay budget cannot take the longer dwell.
    pub(crate) fn hold_at_stop(
        &mut self,
        id: EdgeId,
        extra_time: Time,
        shift: Time,
    ) -> Option<EdgeId> {
        let key = (id, quantize(extra_time), quantize(shift));
        if let Some(&held) = self.derived.held.get(&key) {
            return held;
        }
        let held = self.hold_edge(id, extra_time, shift);
        self.derived.held.insert(key, held);
        held
    }

    fn hold_edge(&mut self, id: EdgeId, extra_time: Time, shift: Time) -> Option<EdgeId> {
        let edge = &self.edges[id];
        if !self.start_node(edge).is_stop() || extra_time > edge.delay_before_conflict - shift {
            return None;
        }

        let mut held = edge.clone();
        held.waiting_time += extra_time;
        held.begin_time += extra_time;
        held.delay_before_conflict -= extra_time;
        held.max_added_delay_after = held
            .max_added_delay_after
            .min(held.delay_before_conflict)
            .min(self.delay_manager.horizon() - held.end_time())
            .min(self.arrival_slack(&held));
        if held.max_added_delay_after < shift - TIME_EPSILON {
            return None;
        }

        debug!("Stop before block {} extended by {extra_time:.1}s", held.block);
        Some(self.edges.push(held))
    }

    /// Copy of `old` running on `envelope`, built from `start`
    pub(crate) fn rebuild_edge(
        &self,
        start: &StdcmNode,
        old: &StdcmEdge,
        envelope: Envelope,
    ) -> Option<StdcmEdge> {
        if (envelope.begin_speed() - start.speed).abs() > SPEED_EPSILON {
            return None;
        }
        let allowance_speed_ratio = self.standard_allowance_speed_ratio(&envelope);
        let edge = StdcmEdge {
            envelope,
            begin_time: start.time + old.waiting_time + old.added_delay,
            engineering_time: 0.0,
            allowance_speed_ratio,
            total_delay: start.total_delay_added + old.added_delay,
            previous: start.previous_edge,
            ..old.clone()
        };
        self.validate_edge(edge, start.max_added_delay_after - old.added_delay)
    }
}

impl Graph for StdcmGraph<'_> {
    type Node = StdcmNode;
    type Edge = EdgeId;

    fn edge_end(&self, edge: &EdgeId) -> StdcmNode {
        self.end_node(*edge)
    }

    fn adjacent_edges(&mut self, node: &StdcmNode) -> Vec<EdgeId> {
        if self.is_destination(node) {
            return Vec::new();
        }
        let key = node.expansion_key();
        if let Some(edges) = self.derived.expansions.get(&key) {
            return edges.clone();
        }

        let starts: Vec<(BlockId, Distance)> = match node.location {
            NodeLocation::OnBlock { block, offset }
                if offset < self.infra.block_length(block) - POSITION_EPSILON =>
            {
                vec![(block, offset)]
            }
            NodeLocation::OnBlock { block, .. } => self
                .infra
                .blocks_starting_at(self.infra.block_exit(block))
                .into_iter()
                .map(|next| (next, 0.0))
                .collect(),
            NodeLocation::Detector(detector) => self
                .infra
                .blocks_starting_at(detector)
                .into_iter()
                .map(|next| (next, 0.0))
                .collect(),
        };

        let mut edges = Vec::new();
        for (block, offset) in starts {
            edges.extend(EdgeBuilder::from_node(self, node, block, offset).make_all_edges());
        }
        self.derived.expansions.insert(key, edges.clone());
        edges
    }
}

fn validate_allowance(allowance: Option<AllowanceValue>) -> Result<(), Error> {
    match allowance {
        Some(AllowanceValue::FixedTime(_)) => Err(Error::InvalidConfig(
            "a fixed time cannot be used as standard allowance".to_string(),
        )),
        Some(AllowanceValue::Percentage(value) | AllowanceValue::TimePerDistance(value))
            if !is_non_negative(value) =>
        {
            Err(Error::InvalidConfig(format!(
                "standard allowance must be a non-negative number, got {value}"
            )))
        }
        _ => Ok(()),
    }
}

fn validate_request(infra: &dyn BlockInfra, request: &StdcmRequest) -> Result<(), Error> {
    let invalid = |message: String| Err(Error::InvalidRequest(message));

    if request.steps.len() < 2 {
        return invalid("at least an origin and a destination are required".to_string());
    }
    if !is_positive(request.max_run_time) {
        return invalid(format!("max run time must be positive, got {}", request.max_run_time));
    }
    if !is_positive(request.time_step) {
        return invalid(format!("time step must be positive, got {}", request.time_step));
    }
    if !is_non_negative(request.max_departure_delay()) {
        return invalid("max departure delay cannot be negative".to_string());
    }

    let rolling_stock = &request.rolling_stock;
    if ![
        rolling_stock.max_speed,
        rolling_stock.acceleration,
        rolling_stock.deceleration,
    ]
    .into_iter()
    .all(is_positive)
    {
        return invalid(format!(
            "rolling stock '{}' needs positive max speed, acceleration and deceleration",
            rolling_stock.name
        ));
    }

    let last = request.steps.len() - 1;
    for (index, step) in request.steps.iter().enumerate() {
        if step.locations.is_empty() {
            return invalid(format!("step {index} has no location"));
        }
        if let Some(window) = step.time_window {
            if window.start > window.end {
                return invalid(format!("step {index} has an empty time window"));
            }
        }
        if let Some(duration) = step.stop_duration {
            if !is_non_negative(duration) {
                return invalid(format!("step {index} has a negative stop duration"));
            }
        }

        for location in &step.locations {
            if !infra.contains_block(location.block) {
                return Err(Error::InvalidBlock(location.block));
            }
            let length = infra.block_length(location.block);
            if !(0.0..=length).contains(&location.offset) {
                return invalid(format!(
                    "step {index} offset {} is outside block {} of length {length}",
                    location.offset, location.block
                ));
            }
            if index > 0 && location.offset <= 0.0 {
                return invalid(format!(
                    "step {index} must be located past the start of block {}",
                    location.block
                ));
            }
            if index > 0 && index < last && step.is_stop() && location.offset >= length {
                return invalid(format!(
                    "stop {index} must be strictly inside block {}",
                    location.block
                ));
            }
        }
    }
    Ok(())
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

fn is_non_negative(value: f64) -> bool {
    value >= 0.0 && value.is_finite()
}
