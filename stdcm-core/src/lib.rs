//! Core of the STDCM (Short-Term Digital Capacity Management) path search.
//!
//! Inserts one new train path into an already occupied timetable: the search
//! graph, the delay / allowance / backtracking managers and the edge builder
//! live in [`routing::stdcm`], the external collaborators (infrastructure,
//! block availability, train physics) are traits in [`infra`].

pub mod algo;
pub mod error;
pub mod infra;
pub mod model;
pub mod prelude;
pub mod routing;

pub use error::Error;
pub use infra::{
    Availability, BlockAvailability, BlockInfra, InMemoryInfra, InfraBuilder, MaxEffortSimulator,
    OccupancyTable, PhysicsProvider, SimulationRequest, SpeedSection,
};
pub use model::{
    AllowanceValue, Comfort, Envelope, RollingStock, SearchBudget, StdcmConfig, StdcmRequest,
    StdcmStep, StepLocation, TimeWindow,
};
pub use routing::stdcm_routing::{PathSection, StdcmPath, find_stdcm_path};

/// Seconds
pub type Time = f64;
/// Meters
pub type Distance = f64;
/// Meters per second
pub type Speed = f64;

pub type BlockId = usize;
pub type DetectorId = usize;

/// Speeds closer than this are considered equal
pub const SPEED_EPSILON: Speed = 1e-3;
/// Times closer than this are considered equal
pub const TIME_EPSILON: Time = 1e-3;
/// Offsets closer than this are the same location
pub const POSITION_EPSILON: Distance = 1e-3;
