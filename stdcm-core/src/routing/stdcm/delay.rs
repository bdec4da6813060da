use log::trace;

use super::edge::StdcmEdge;
use crate::infra::{Availability, BlockAvailability};
use crate::{BlockId, SPEED_EPSILON, TIME_EPSILON, Time};

/// Decides how long a traversal has to be postponed to avoid the trains
/// already in the timetable.
#[derive(Clone, Copy)]
pub struct DelayManager<'a> {
    availability: &'a dyn BlockAvailability,
    horizon: Time,
    max_openings: usize,
}

impl<'a> DelayManager<'a> {
    pub fn new(
        availability: &'a dyn BlockAvailability,
        horizon: Time,
        max_openings: usize,
    ) -> Self {
        Self {
            availability,
            horizon,
            max_openings: max_openings.max(1),
        }
    }

    /// No occupation may end after this time
    pub fn horizon(&self) -> Time {
        self.horizon
    }

    /// Minimal delays to apply to `start_time`, one per free window of the
    /// block, in increasing order.
    ///
    /// The occupation starts `waiting_time` before the train moves (it is
    /// already standing in the block) and lasts until the end of the run.
    /// Windows that would end after the horizon are not listed.
    pub fn minimum_delays_per_opening(
        &self,
        block: BlockId,
        start_time: Time,
        waiting_time: Time,
        run_time: Time,
    ) -> Vec<Time> {
        let duration = waiting_time + run_time;
        let horizon = self.horizon();
        let mut delays = Vec::new();
        let mut time = start_time;

        while delays.len() < self.max_openings {
            if time + run_time > horizon + TIME_EPSILON {
                break;
            }
            match self
                .availability
                .availability(block, time - waiting_time, duration)
            {
                Availability::Available { max_delay } => {
                    trace!(
                        "Block {block} free at {time:.1} for {:.1} more seconds",
                        max_delay
                    );
                    delays.push(time - start_time);
                    if !max_delay.is_finite() {
                        break;
                    }
                    // The window closes with the next train, look behind it
                    let after_conflict = time + max_delay + TIME_EPSILON;
                    time = match self.availability.availability(
                        block,
                        after_conflict - waiting_time,
                        duration,
                    ) {
                        Availability::Unavailable {
                            next_available_start,
                        } => next_available_start + waiting_time,
                        Availability::Available { .. } => after_conflict,
                    };
                }
                Availability::Unavailable {
                    next_available_start,
                } => {
                    time = next_available_start + waiting_time;
                }
            }
        }
        delays
    }

    /// Free time left after the given occupation, `None` on conflict
    pub fn delay_before_conflict(
        &self,
        block: BlockId,
        occupancy_start: Time,
        occupancy_duration: Time,
    ) -> Option<Time> {
        match self
            .availability
            .availability(block, occupancy_start, occupancy_duration)
        {
            Availability::Available { max_delay } => Some(max_delay),
            Availability::Unavailable { .. } => None,
        }
    }
}

/// Pareto dominance between two edges leaving the same node: `edge` is
/// dominated when `other` ends at the same place and step, no later, no
/// slower, and leaves at least as much departure-delay budget.
pub(crate) fn is_dominated(edge: &StdcmEdge, other: &StdcmEdge) -> bool {
    edge.block == other.block
        && edge.step_index == other.step_index
        && (edge.end_offset() - other.end_offset()).abs() < 1e-6
        && other.end_time() <= edge.end_time() + TIME_EPSILON
        && other.exit_speed() >= edge.exit_speed() - SPEED_EPSILON
        && other.max_added_delay_after >= edge.max_added_delay_after - TIME_EPSILON
}
