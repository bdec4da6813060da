use std::cmp::Ordering;

/// Heap entry, ordered for a min-heap: lowest cost first, then lowest
/// tie-break, then first inserted.
#[derive(Copy, Clone, Debug)]
pub(crate) struct State<T> {
    pub(crate) cost: f64,
    pub(crate) tie_break: f64,
    pub(crate) sequence: usize,
    pub(crate) item: T,
}

// Implement Ord for State to use in BinaryHeap
impl<T> Ord for State<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap (reversed from standard Rust BinaryHeap)
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.tie_break.total_cmp(&self.tie_break))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for State<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for State<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for State<T> {}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn state(cost: f64, tie_break: f64, sequence: usize) -> State<usize> {
        State {
            cost,
            tie_break,
            sequence,
            item: sequence,
        }
    }

    #[test]
    fn test_heap_pops_lowest_cost_then_tie_break() {
        let mut heap = BinaryHeap::new();
        heap.push(state(10.0, 0.0, 0));
        heap.push(state(5.0, 3.0, 1));
        heap.push(state(5.0, 1.0, 2));
        heap.push(state(5.0, 1.0, 3));

        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|s| s.item)).collect();
        assert_eq!(order, vec![2, 3, 1, 0]);
    }
}
