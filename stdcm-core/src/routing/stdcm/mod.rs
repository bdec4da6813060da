//! The STDCM problem encoded as a graph for the generic search engine.
//!
//! Most of the logic lives in helpers owned by [`StdcmGraph`]:
//! the [`DelayManager`] finds how much delay is needed to avoid conflicts,
//! the [`AllowanceManager`] turns schedule margins into slower running,
//! the [`BacktrackingManager`] fixes speed discontinuities found late,
//! and the edge builder creates the edges themselves.

mod allowance;
mod backtracking;
mod delay;
mod edge;
mod edge_builder;
mod graph;
mod node;

pub use allowance::{AllowanceManager, EngineeringOutcome};
pub use backtracking::BacktrackingManager;
pub use delay::DelayManager;
pub use edge::{EdgeArena, EdgeId, StdcmEdge};
pub use graph::StdcmGraph;
pub use node::{NodeLocation, StdcmNode};

pub(crate) use node::LocationKey;
