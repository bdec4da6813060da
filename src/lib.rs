//! Command line front end of `stdcm_core`: loads scenario files and reports
//! the inserted train paths as JSON.

pub mod report;
pub mod scenario;

pub use report::{Report, run_scenario};
pub use scenario::{Problem, Scenario, ScenarioError, load_scenario};
