//! Collaborators of the STDCM search: infrastructure topology, block
//! availability and train physics.
//!
//! The search only talks to the traits defined here. Each trait comes with
//! one reference implementation used by tests and the command line tool.

mod network;
mod occupancy;
mod simulation;

pub use network::{InMemoryInfra, InfraBuilder};
pub use occupancy::{Occupancy, OccupancyTable};
pub use simulation::MaxEffortSimulator;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::model::{Comfort, Envelope, RollingStock};
use crate::{BlockId, DetectorId, Distance, Speed, Time};

/// Speed limit over `[start, end]`, offsets from the block entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSection {
    pub start: Distance,
    pub end: Distance,
    pub speed: Speed,
}

/// Block adjacency and static constraints.
///
/// Methods taking a `BlockId` may assume the block exists; callers check
/// external input with [`BlockInfra::contains_block`] first.
pub trait BlockInfra {
    fn contains_block(&self, block: BlockId) -> bool;
    fn blocks_starting_at(&self, detector: DetectorId) -> Vec<BlockId>;
    fn blocks_ending_at(&self, detector: DetectorId) -> Vec<BlockId>;
    /// # Panics
    ///
    /// Implementations may panic when `contains_block(block)` is false.
    fn block_entry(&self, block: BlockId) -> DetectorId;
    /// # Panics
    ///
    /// Implementations may panic when `contains_block(block)` is false.
    fn block_exit(&self, block: BlockId) -> DetectorId;
    fn block_length(&self, block: BlockId) -> Distance;
    /// Speed limits applying to a train with the given tag
    fn speed_limits(&self, block: BlockId, tag: Option<&str>) -> Vec<SpeedSection>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability {
    /// The block is free; the occupation could start up to `max_delay` later
    /// and still be free (infinite when nothing is scheduled afterwards).
    Available { max_delay: Time },
    /// The block is busy; the earliest start that fits the whole duration.
    Unavailable { next_available_start: Time },
}

/// Occupation of blocks by the trains already in the timetable
pub trait BlockAvailability {
    fn availability(&self, block: BlockId, start_time: Time, duration: Time) -> Availability;
}

/// Everything the physics needs to simulate one traversal
#[derive(Debug, Clone)]
pub struct SimulationRequest<'a> {
    pub entry_speed: Speed,
    pub block_length: Distance,
    pub start_offset: Distance,
    pub end_offset: Distance,
    pub speed_limits: &'a [SpeedSection],
    pub rolling_stock: &'a RollingStock,
    pub comfort: Comfort,
    /// Speed the train must be able to leave the segment at, zero for a stop
    pub max_exit_speed: Option<Speed>,
    pub time_step: Time,
}

/// Train performance simulation over a block segment.
///
/// The returned envelope starts at `entry_speed` when possible. When the
/// segment's constraints make that speed impossible to honour, the envelope
/// starts at the highest admissible speed instead, which is lower.
pub trait PhysicsProvider {
    fn simulate(&self, request: &SimulationRequest<'_>) -> Result<Envelope, SimulationError>;
}
