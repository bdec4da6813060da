use thiserror::Error;

use crate::BlockId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid block ID {0}")]
    InvalidBlock(BlockId),
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Search aborted after {expansions} expansions")]
    SearchAborted { expansions: usize },
}

#[derive(Error, Debug, PartialEq)]
pub enum SimulationError {
    #[error("Envelope needs at least two points")]
    EmptyEnvelope,
    #[error("Envelope positions must be strictly increasing")]
    NonIncreasingPositions,
    #[error("Train cannot move at position {0}")]
    Stalled(f64),
    #[error("Invalid segment [{start}, {end}] on a block of length {length}")]
    InvalidSegment { start: f64, end: f64, length: f64 },
}
