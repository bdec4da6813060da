// Re-export key components
pub use crate::algo::RemainingTimeEstimator;
pub use crate::error::{Error, SimulationError};
pub use crate::infra::{
    Availability, BlockAvailability, BlockInfra, InMemoryInfra, InfraBuilder, MaxEffortSimulator,
    OccupancyTable, PhysicsProvider, SimulationRequest, SpeedSection,
};
pub use crate::model::{
    AllowanceValue, Comfort, Envelope, RollingStock, SearchBudget, StdcmConfig, StdcmRequest,
    StdcmStep, StepLocation, TimeWindow,
};
pub use crate::routing::stdcm::{StdcmGraph, StdcmNode};
pub use crate::routing::stdcm_routing::{PathSection, StdcmPath, find_stdcm_path};

// Units
pub use crate::Distance; // meters
pub use crate::Speed; // meters per second
pub use crate::Time; // seconds

// Identifiers
pub use crate::BlockId;
pub use crate::DetectorId;
