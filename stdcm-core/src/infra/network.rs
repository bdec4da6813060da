use hashbrown::HashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::{BlockInfra, SpeedSection};
use crate::{BlockId, DetectorId, Distance};

#[derive(Debug, Clone)]
struct DetectorData {
    name: String,
}

#[derive(Debug, Clone)]
struct BlockData {
    name: String,
    length: Distance,
    speed_limits: Vec<SpeedSection>,
    /// Replace `speed_limits` for trains with a matching tag
    tagged_speed_limits: HashMap<String, Vec<SpeedSection>>,
}

/// Block graph held in memory: detectors are nodes, blocks are directed
/// edges from their entry detector to their exit detector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInfra {
    graph: DiGraph<DetectorData, BlockData>,
    detectors_by_name: HashMap<String, DetectorId>,
    blocks_by_name: HashMap<String, BlockId>,
}

impl InMemoryInfra {
    pub fn block_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn detector_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks_by_name.get(name).copied()
    }

    pub fn find_detector(&self, name: &str) -> Option<DetectorId> {
        self.detectors_by_name.get(name).copied()
    }

    pub fn block_name(&self, block: BlockId) -> Option<&str> {
        self.graph
            .edge_weight(EdgeIndex::new(block))
            .map(|data| data.name.as_str())
    }

    pub fn detector_name(&self, detector: DetectorId) -> Option<&str> {
        self.graph
            .node_weight(NodeIndex::new(detector))
            .map(|data| data.name.as_str())
    }

    /// # Panics
    ///
    /// On a block that was never added.
    fn block(&self, block: BlockId) -> &BlockData {
        &self.graph[EdgeIndex::new(block)]
    }

    /// # Panics
    ///
    /// On a block that was never added.
    fn endpoints(&self, block: BlockId) -> (NodeIndex, NodeIndex) {
        self.graph
            .edge_endpoints(EdgeIndex::new(block))
            .unwrap_or_else(|| panic!("unknown block {block}"))
    }
}

impl BlockInfra for InMemoryInfra {
    fn contains_block(&self, block: BlockId) -> bool {
        block < self.graph.edge_count()
    }

    fn blocks_starting_at(&self, detector: DetectorId) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .graph
            .edges_directed(NodeIndex::new(detector), Direction::Outgoing)
            .map(|edge| edge.id().index())
            .collect();
        // petgraph lists the most recent edge first
        blocks.sort_unstable();
        blocks
    }

    fn blocks_ending_at(&self, detector: DetectorId) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .graph
            .edges_directed(NodeIndex::new(detector), Direction::Incoming)
            .map(|edge| edge.id().index())
            .collect();
        blocks.sort_unstable();
        blocks
    }

    fn block_entry(&self, block: BlockId) -> DetectorId {
        self.endpoints(block).0.index()
    }

    fn block_exit(&self, block: BlockId) -> DetectorId {
        self.endpoints(block).1.index()
    }

    fn block_length(&self, block: BlockId) -> Distance {
        self.block(block).length
    }

    fn speed_limits(&self, block: BlockId, tag: Option<&str>) -> Vec<SpeedSection> {
        let data = self.block(block);
        tag.and_then(|tag| data.tagged_speed_limits.get(tag))
            .unwrap_or(&data.speed_limits)
            .clone()
    }
}

/// Incremental construction of an [`InMemoryInfra`]
#[derive(Debug, Default)]
pub struct InfraBuilder {
    infra: InMemoryInfra,
}

impl InfraBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a detector, or returns the existing one with that name
    pub fn add_detector(&mut self, name: &str) -> DetectorId {
        if let Some(id) = self.infra.find_detector(name) {
            return id;
        }
        let id = self
            .infra
            .graph
            .add_node(DetectorData {
                name: name.to_string(),
            })
            .index();
        self.infra.detectors_by_name.insert(name.to_string(), id);
        id
    }

    pub fn add_block(
        &mut self,
        name: &str,
        entry: DetectorId,
        exit: DetectorId,
        length: Distance,
        speed_limits: Vec<SpeedSection>,
    ) -> BlockId {
        let id = self
            .infra
            .graph
            .add_edge(
                NodeIndex::new(entry),
                NodeIndex::new(exit),
                BlockData {
                    name: name.to_string(),
                    length,
                    speed_limits,
                    tagged_speed_limits: HashMap::new(),
                },
            )
            .index();
        self.infra.blocks_by_name.insert(name.to_string(), id);
        id
    }

    pub fn add_tagged_speed_limits(
        &mut self,
        block: BlockId,
        tag: &str,
        speed_limits: Vec<SpeedSection>,
    ) {
        if let Some(data) = self.infra.graph.edge_weight_mut(EdgeIndex::new(block)) {
            data.tagged_speed_limits
                .insert(tag.to_string(), speed_limits);
        }
    }

    pub fn build(self) -> InMemoryInfra {
        self.infra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork() -> (InMemoryInfra, [BlockId; 3]) {
        let mut builder = InfraBuilder::new();
        let a = builder.add_detector("A");
        let b = builder.add_detector("B");
        let c = builder.add_detector("C");
        let d = builder.add_detector("D");
        let ab = builder.add_block("AB", a, b, 1000.0, vec![]);
        let bc = builder.add_block(
            "BC",
            b,
            c,
            800.0,
            vec![SpeedSection {
                start: 0.0,
                end: 800.0,
                speed: 20.0,
            }],
        );
        let bd = builder.add_block("BD", b, d, 600.0, vec![]);
        builder.add_tagged_speed_limits(
            bc,
            "freight",
            vec![SpeedSection {
                start: 0.0,
                end: 800.0,
                speed: 15.0,
            }],
        );
        (builder.build(), [ab, bc, bd])
    }

    #[test]
    fn test_adjacency() {
        let (infra, [ab, bc, bd]) = fork();
        let b = infra.find_detector("B").expect("detector B");
        assert_eq!(infra.blocks_starting_at(b), vec![bc, bd]);
        assert_eq!(infra.blocks_ending_at(b), vec![ab]);
        assert_eq!(infra.block_exit(ab), b);
        assert_eq!(infra.block_entry(bd), b);
        assert_eq!(infra.find_block("BD"), Some(bd));
        assert!(infra.contains_block(bd));
        assert!(!infra.contains_block(42));
    }

    #[test]
    #[should_panic(expected = "unknown block 42")]
    fn test_unknown_block_endpoints() {
        let (infra, _) = fork();
        infra.block_exit(42);
    }

    #[test]
    fn test_names() {
        let (infra, [ab, ..]) = fork();
        assert_eq!(infra.block_name(ab), Some("AB"));
        assert_eq!(infra.detector_name(infra.block_exit(ab)), Some("B"));
        assert_eq!(infra.block_name(42), None);
    }

    #[test]
    fn test_tagged_speed_limits() {
        let (infra, [_, bc, _]) = fork();
        assert_eq!(infra.speed_limits(bc, None)[0].speed, 20.0);
        assert_eq!(infra.speed_limits(bc, Some("freight"))[0].speed, 15.0);
        assert_eq!(infra.speed_limits(bc, Some("unknown"))[0].speed, 20.0);
    }

    #[test]
    fn test_detector_deduplication() {
        let mut builder = InfraBuilder::new();
        let first = builder.add_detector("X");
        let second = builder.add_detector("X");
        assert_eq!(first, second);
        assert_eq!(builder.build().detector_count(), 1);
    }
}
