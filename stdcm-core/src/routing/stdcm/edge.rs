use std::ops::Index;

use hashbrown::HashMap;

use super::node::ExpansionKey;

use crate::model::Envelope;
use crate::{BlockId, Distance, Speed, Time};

/// Handle of an edge in the [`EdgeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Traversal of one block, or of the part of it between two locations.
///
/// Times are expressed as the edge was built. Departure shifts decided
/// further along the path move the whole edge by
/// `final total_delay - self.total_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct StdcmEdge {
    pub block: BlockId,
    /// Covers `[start_offset, end_offset]` of the block
    pub envelope: Envelope,
    /// When the train starts moving on this edge
    pub begin_time: Time,
    /// Departure shift introduced by this edge
    pub added_delay: Time,
    /// Time spent standing before `begin_time`: stop dwell and extra wait
    pub waiting_time: Time,
    /// Running time added by an engineering allowance
    pub engineering_time: Time,
    pub allowance_speed_ratio: f64,
    /// Departure shift accumulated up to and including this edge
    pub total_delay: Time,
    pub max_added_delay_after: Time,
    /// Free time between the end of this occupation and the next scheduled train
    pub delay_before_conflict: Time,
    pub previous: Option<EdgeId>,
    /// Step index once this edge is done
    pub step_index: usize,
    /// Whether this edge ends on a step location
    pub ends_on_step: bool,
    /// Set when the edge ends on a stop
    pub stop_duration: Option<Time>,
}

impl StdcmEdge {
    pub fn start_offset(&self) -> Distance {
        self.envelope.begin_position()
    }

    pub fn end_offset(&self) -> Distance {
        self.envelope.end_position()
    }

    pub fn entry_speed(&self) -> Speed {
        self.envelope.begin_speed()
    }

    pub fn exit_speed(&self) -> Speed {
        self.envelope.end_speed()
    }

    /// Running time once the standard allowance is applied
    pub fn run_time(&self) -> Time {
        self.envelope.total_time() / self.allowance_speed_ratio
    }

    pub fn end_time(&self) -> Time {
        self.begin_time + self.run_time()
    }

    /// The block is held from the start of the wait preceding the run
    pub fn occupancy_start(&self) -> Time {
        self.begin_time - self.waiting_time
    }

    pub fn occupancy_duration(&self) -> Time {
        self.end_time() - self.occupancy_start()
    }
}

/// Owns every edge built during one search; edges refer to their
/// predecessor by id.
#[derive(Debug, Default)]
pub struct EdgeArena {
    edges: Vec<StdcmEdge>,
}

impl EdgeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: StdcmEdge) -> EdgeId {
        self.edges.push(edge);
        EdgeId(self.edges.len() - 1)
    }

    pub fn get(&self, id: EdgeId) -> Option<&StdcmEdge> {
        self.edges.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges from the origin up to `last`, in travel order
    pub fn path_to(&self, last: EdgeId) -> Vec<EdgeId> {
        let mut path: Vec<EdgeId> =
            std::iter::successors(Some(last), |&id| self[id].previous).collect();
        path.reverse();
        path
    }
}

impl Index<EdgeId> for EdgeArena {
    type Output = StdcmEdge;

    fn index(&self, id: EdgeId) -> &StdcmEdge {
        &self.edges[id.0]
    }
}

/// Results of the operations deriving new edges from existing ones, kept
/// for the whole search so that asking twice returns the same edges and the
/// arena does not fill up with copies.
#[derive(Debug, Default)]
pub(crate) struct DerivedEdges {
    /// Node expansions
    pub(crate) expansions: HashMap<ExpansionKey, Vec<EdgeId>>,
    /// Backtracking repairs, by edge and exit speed
    pub(crate) repaired: HashMap<(EdgeId, i64), Option<EdgeId>>,
    /// Longer stops, by edge, extra time and departure shift
    pub(crate) held: HashMap<(EdgeId, i64, i64), Option<EdgeId>>,
    /// Engineering allowances, by edge, extra time and departure shift
    pub(crate) slowed: HashMap<(EdgeId, i64, i64), Result<EdgeId, Time>>,
}
