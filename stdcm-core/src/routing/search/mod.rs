//! Generic best-first (A*) search.
//!
//! The engine owns the open set and the expansion order; the graph only
//! answers adjacency queries and the policy decides costs, targets and
//! which nodes are not worth expanding.

mod state;

pub(crate) use state::State;

use std::collections::BinaryHeap;
use std::time::Instant;

use crate::model::SearchBudget;

/// Adjacency contract consumed by [`astar`]
pub trait Graph {
    type Node;
    type Edge;

    fn edge_end(&self, edge: &Self::Edge) -> Self::Node;
    fn adjacent_edges(&mut self, node: &Self::Node) -> Vec<Self::Edge>;
}

/// Costs and filters of one search
pub trait SearchPolicy<N> {
    fn cost(&self, node: &N) -> f64;

    /// Lower is preferred among nodes with the same priority
    fn tie_break(&self, _node: &N) -> f64 {
        0.0
    }

    /// Lower bound of the remaining cost, infinite when the target is unreachable
    fn heuristic(&self, _node: &N) -> f64 {
        0.0
    }

    fn is_target(&self, node: &N) -> bool;

    /// Called once per popped node, before expanding it
    fn should_skip(&mut self, _node: &N) -> bool {
        false
    }
}

#[derive(Debug)]
pub enum SearchOutcome<N> {
    Found(N),
    /// The open set ran empty without reaching a target
    Exhausted { expansions: usize },
    /// The budget ran out first
    Aborted { expansions: usize },
}

pub fn astar<G, P>(
    graph: &mut G,
    starts: impl IntoIterator<Item = G::Node>,
    policy: &mut P,
    budget: &SearchBudget,
) -> SearchOutcome<G::Node>
where
    G: Graph,
    P: SearchPolicy<G::Node>,
{
    let deadline = budget.timeout().map(|timeout| Instant::now() + timeout);
    let mut nodes: Vec<G::Node> = Vec::new();
    let mut heap = BinaryHeap::new();

    for start in starts {
        push(start, &mut nodes, &mut heap, &*policy);
    }

    let mut expansions = 0;
    while let Some(State { item: index, .. }) = heap.pop() {
        if budget.max_expansions.is_some_and(|max| expansions >= max)
            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            return SearchOutcome::Aborted { expansions };
        }

        if policy.is_target(&nodes[index]) {
            return SearchOutcome::Found(nodes.swap_remove(index));
        }
        if policy.should_skip(&nodes[index]) {
            continue;
        }

        expansions += 1;
        let edges = graph.adjacent_edges(&nodes[index]);
        for edge in edges {
            let next = graph.edge_end(&edge);
            push(next, &mut nodes, &mut heap, &*policy);
        }
    }

    SearchOutcome::Exhausted { expansions }
}

fn push<N, P: SearchPolicy<N>>(
    node: N,
    nodes: &mut Vec<N>,
    heap: &mut BinaryHeap<State<usize>>,
    policy: &P,
) {
    let priority = policy.cost(&node) + policy.heuristic(&node);
    if !priority.is_finite() {
        return;
    }
    let index = nodes.len();
    heap.push(State {
        cost: priority,
        tie_break: policy.tie_break(&node),
        sequence: index,
        item: index,
    });
    nodes.push(node);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Weighted digraph given as `(from, to, weight)` triples
    struct TestGraph {
        edges: Vec<(usize, usize, f64)>,
        expanded: Vec<usize>,
    }

    impl Graph for TestGraph {
        type Node = (usize, f64);
        type Edge = (usize, f64);

        fn edge_end(&self, edge: &Self::Edge) -> Self::Node {
            *edge
        }

        fn adjacent_edges(&mut self, node: &Self::Node) -> Vec<Self::Edge> {
            self.expanded.push(node.0);
            self.edges
                .iter()
                .filter(|(from, _, _)| *from == node.0)
                .map(|&(_, to, weight)| (to, node.1 + weight))
                .collect()
        }
    }

    struct ToTarget(usize);

    impl SearchPolicy<(usize, f64)> for ToTarget {
        fn cost(&self, node: &(usize, f64)) -> f64 {
            node.1
        }

        fn is_target(&self, node: &(usize, f64)) -> bool {
            node.0 == self.0
        }
    }

    fn diamond() -> TestGraph {
        TestGraph {
            edges: vec![(0, 1, 5.0), (0, 2, 1.0), (2, 1, 1.0), (1, 3, 1.0)],
            expanded: Vec::new(),
        }
    }

    #[test]
    fn test_finds_cheapest_path() {
        let mut graph = diamond();
        let outcome = astar(
            &mut graph,
            [(0, 0.0)],
            &mut ToTarget(3),
            &SearchBudget::unlimited(),
        );
        match outcome {
            SearchOutcome::Found((node, cost)) => {
                assert_eq!(node, 3);
                assert!((cost - 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_when_unreachable() {
        let mut graph = diamond();
        let outcome = astar(
            &mut graph,
            [(0, 0.0)],
            &mut ToTarget(42),
            &SearchBudget::unlimited(),
        );
        assert!(matches!(outcome, SearchOutcome::Exhausted { .. }));
    }

    #[test]
    fn test_budget_aborts_search() {
        let mut graph = diamond();
        let budget = SearchBudget {
            max_expansions: Some(1),
            timeout_secs: None,
        };
        let outcome = astar(&mut graph, [(0, 0.0)], &mut ToTarget(3), &budget);
        assert!(matches!(outcome, SearchOutcome::Aborted { expansions: 1 }));
        assert_eq!(graph.expanded, vec![0]);
    }
}
