//! Path search: a generic best-first engine and the STDCM graph it explores.

pub mod search;
pub mod stdcm;
pub mod stdcm_routing;

pub use search::{Graph, SearchOutcome, SearchPolicy, astar};
pub use stdcm_routing::{PathSection, StdcmPath, find_stdcm_path};
