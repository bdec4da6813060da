use super::edge::EdgeId;
use crate::{BlockId, DetectorId, Distance, Speed, Time};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeLocation {
    /// On a block boundary
    Detector(DetectorId),
    /// Inside a block, `offset` meters after its entry
    OnBlock { block: BlockId, offset: Distance },
}

/// Search graph vertex: where the train is, when, and how fast
#[derive(Debug, Clone, PartialEq)]
pub struct StdcmNode {
    pub location: NodeLocation,
    /// Earliest arrival at this location
    pub time: Time,
    pub speed: Speed,
    /// Departure shift accumulated along the path
    pub total_delay_added: Time,
    /// How much more the departure can still be shifted without conflicts
    pub max_added_delay_after: Time,
    /// Index of the next step to reach, all previous ones are done
    pub step_index: usize,
    /// Edge this node was derived from, `None` at the origin
    pub previous_edge: Option<EdgeId>,
    /// Set when the train stops here
    pub stop_duration: Option<Time>,
}

impl StdcmNode {
    pub fn is_stop(&self) -> bool {
        self.stop_duration.is_some()
    }

    /// Everything the edges leaving this node depend on
    pub(crate) fn expansion_key(&self) -> ExpansionKey {
        ExpansionKey {
            previous_edge: self.previous_edge,
            location: self.location_key(),
            step_index: self.step_index,
            time: quantize(self.time),
            speed: quantize(self.speed),
            total_delay_added: quantize(self.total_delay_added),
            max_added_delay_after: quantize(self.max_added_delay_after),
        }
    }

    pub(crate) fn location_key(&self) -> LocationKey {
        match self.location {
            NodeLocation::Detector(detector) => LocationKey::Detector(detector),
            NodeLocation::OnBlock { block, offset } => {
                LocationKey::OnBlock(block, quantize(offset))
            }
        }
    }
}

/// Hashable form of a time, offset or speed, rounded to a thousandth
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn quantize(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

/// Hashable location, offsets rounded to the millimeter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LocationKey {
    Detector(DetectorId),
    OnBlock(BlockId, i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ExpansionKey {
    previous_edge: Option<EdgeId>,
    location: LocationKey,
    step_index: usize,
    time: i64,
    speed: i64,
    total_delay_added: i64,
    max_added_delay_after: i64,
}
