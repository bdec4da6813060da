pub mod heuristic;

pub use heuristic::RemainingTimeEstimator;
