use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{Availability, BlockAvailability};
use crate::{BlockId, Time};

/// Time interval during which a scheduled train holds a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupancy {
    pub start: Time,
    pub end: Time,
    #[serde(default)]
    pub train: Option<String>,
}

/// Block occupations of the existing timetable.
///
/// A new occupation `[s, e]` conflicts with a scheduled `[a, b]` when
/// `s < b + margin_before` and `a < e + margin_after`: the margins are the
/// free time required before and after the new train.
#[derive(Debug, Clone, Default)]
pub struct OccupancyTable {
    occupancies: HashMap<BlockId, Vec<Occupancy>>,
    margin_before: Time,
    margin_after: Time,
}

impl OccupancyTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_margins(mut self, margin_before: Time, margin_after: Time) -> Self {
        self.margin_before = margin_before.max(0.0);
        self.margin_after = margin_after.max(0.0);
        self
    }

    pub fn add(&mut self, block: BlockId, start: Time, end: Time, train: Option<String>) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let list = self.occupancies.entry(block).or_default();
        let pos = list.partition_point(|occupancy| occupancy.start <= start);
        list.insert(pos, Occupancy { start, end, train });
    }

    pub fn occupancies(&self, block: BlockId) -> &[Occupancy] {
        self.occupancies.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.occupancies.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn conflicts(&self, occupancy: &Occupancy, start: Time, end: Time) -> bool {
        start < occupancy.end + self.margin_before && occupancy.start < end + self.margin_after
    }
}

impl BlockAvailability for OccupancyTable {
    fn availability(&self, block: BlockId, start_time: Time, duration: Time) -> Availability {
        let occupancies = self.occupancies(block);
        let duration = duration.max(0.0);

        let mut start = start_time;
        let mut moved = false;
        // Every pass jumps past the latest conflicting release, so this ends
        // after at most one pass per occupancy.
        loop {
            let end = start + duration;
            let release = occupancies
                .iter()
                .filter(|occupancy| self.conflicts(occupancy, start, end))
                .map(|occupancy| occupancy.end + self.margin_before)
                .fold(None, |acc: Option<Time>, t| Some(acc.map_or(t, |a| a.max(t))));
            match release {
                Some(release) => {
                    start = release;
                    moved = true;
                }
                None => break,
            }
        }

        if moved {
            return Availability::Unavailable {
                next_available_start: start,
            };
        }

        let end = start + duration;
        let max_delay = occupancies
            .iter()
            .filter(|occupancy| occupancy.start >= end + self.margin_after)
            .map(|occupancy| occupancy.start - self.margin_after - end)
            .fold(f64::INFINITY, f64::min);
        Availability::Available { max_delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> OccupancyTable {
        let mut table = OccupancyTable::new();
        table.add(1, 100.0, 160.0, Some("train A".to_string()));
        table.add(1, 300.0, 400.0, Some("train B".to_string()));
        table
    }

    #[test]
    fn test_free_block() {
        let availability = table().availability(7, 0.0, 1000.0);
        assert_eq!(
            availability,
            Availability::Available {
                max_delay: f64::INFINITY
            }
        );
    }

    #[test]
    fn test_available_before_first_train() {
        let availability = table().availability(1, 20.0, 50.0);
        assert_eq!(availability, Availability::Available { max_delay: 30.0 });
    }

    #[test]
    fn test_unavailable_jumps_to_release() {
        let availability = table().availability(1, 90.0, 50.0);
        assert_eq!(
            availability,
            Availability::Unavailable {
                next_available_start: 160.0
            }
        );
    }

    #[test]
    fn test_gap_too_short_skips_to_last_release() {
        // 160..300 is free but shorter than the 200 s needed
        let availability = table().availability(1, 120.0, 200.0);
        assert_eq!(
            availability,
            Availability::Unavailable {
                next_available_start: 400.0
            }
        );
    }

    #[test]
    fn test_margins_widen_conflicts() {
        let table = table().with_margins(10.0, 5.0);
        assert_eq!(
            table.availability(1, 160.0, 50.0),
            Availability::Unavailable {
                next_available_start: 170.0
            }
        );
        assert_eq!(
            table.availability(1, 170.0, 50.0),
            Availability::Available { max_delay: 75.0 }
        );
    }

    #[test]
    fn test_insertion_keeps_order() {
        let mut table = table();
        table.add(1, 200.0, 250.0, None);
        let starts: Vec<Time> = table.occupancies(1).iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![100.0, 200.0, 300.0]);
        assert_eq!(table.len(), 3);
    }
}
