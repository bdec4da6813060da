use itertools::Itertools;

use super::{PhysicsProvider, SimulationRequest, SpeedSection};
use crate::error::SimulationError;
use crate::model::Envelope;
use crate::{Distance, Speed};

/// Grid spacing bounds in meters
const MIN_SPACING: Distance = 1.0;
const MAX_SPACING: Distance = 200.0;

/// Max effort train: accelerates as hard as it can, brakes as late as it can.
///
/// The segment is sampled on a grid that always contains the speed limit
/// breakpoints. A backward pass builds the braking curves from every limit
/// and from the exit target, then a forward pass applies traction from the
/// entry speed. Between two samples acceleration is constant.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxEffortSimulator;

impl MaxEffortSimulator {
    pub fn new() -> Self {
        Self
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn grid(request: &SimulationRequest<'_>) -> Vec<Distance> {
        let start = request.start_offset;
        let end = request.end_offset;
        let spacing =
            (request.rolling_stock.max_speed * request.time_step).clamp(MIN_SPACING, MAX_SPACING);

        let breakpoints = request
            .speed_limits
            .iter()
            .flat_map(|section| [section.start, section.end])
            .filter(|&x| x > start && x < end)
            .chain([start, end])
            .sorted_by(f64::total_cmp)
            .dedup_by(|a, b| (a - b).abs() < 1e-6);

        let mut grid = Vec::new();
        for (from, to) in breakpoints.tuple_windows() {
            // Two intervals at least, so a short hop between two standstills
            // still gets an acceleration and a braking half
            let steps = ((to - from) / spacing).ceil().max(2.0) as usize;
            grid.extend((0..steps).map(|i| from + (to - from) * i as f64 / steps as f64));
        }
        grid.push(end);
        grid
    }
}

/// Most restrictive limit at `position`; on a breakpoint both sides apply
fn limit_at(sections: &[SpeedSection], max_speed: Speed, position: Distance) -> Speed {
    sections
        .iter()
        .filter(|section| section.start <= position && position <= section.end)
        .map(|section| section.speed)
        .fold(max_speed, f64::min)
}

impl PhysicsProvider for MaxEffortSimulator {
    fn simulate(&self, request: &SimulationRequest<'_>) -> Result<Envelope, SimulationError> {
        if request.start_offset < 0.0
            || request.end_offset <= request.start_offset
            || request.end_offset > request.block_length + 1e-6
        {
            return Err(SimulationError::InvalidSegment {
                start: request.start_offset,
                end: request.end_offset,
                length: request.block_length,
            });
        }

        let acceleration = request.rolling_stock.acceleration(request.comfort);
        let deceleration = request.rolling_stock.deceleration;
        let max_speed = request.rolling_stock.max_speed;

        let positions = Self::grid(request);
        let limits: Vec<Speed> = positions
            .iter()
            .map(|&x| limit_at(request.speed_limits, max_speed, x))
            .collect();

        // Braking curves
        let n = positions.len();
        let mut speeds = limits.clone();
        if let Some(exit) = request.max_exit_speed {
            speeds[n - 1] = speeds[n - 1].min(exit.max(0.0));
        }
        for i in (0..n - 1).rev() {
            let dx = positions[i + 1] - positions[i];
            let braking = (speeds[i + 1].powi(2) + 2.0 * deceleration * dx).sqrt();
            speeds[i] = speeds[i].min(braking);
        }

        // Traction
        speeds[0] = speeds[0].min(request.entry_speed.max(0.0));
        for i in 0..n - 1 {
            let dx = positions[i + 1] - positions[i];
            let traction = (speeds[i].powi(2) + 2.0 * acceleration * dx).sqrt();
            speeds[i + 1] = speeds[i + 1].min(traction);
        }

        Envelope::from_points(positions, speeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comfort, RollingStock};

    fn rolling_stock() -> RollingStock {
        RollingStock {
            name: "test".to_string(),
            max_speed: 40.0,
            acceleration: 0.5,
            deceleration: 0.5,
            auxiliary_power_share: 0.0,
        }
    }

    fn request<'a>(
        rolling_stock: &'a RollingStock,
        limits: &'a [SpeedSection],
        entry_speed: Speed,
        max_exit_speed: Option<Speed>,
    ) -> SimulationRequest<'a> {
        SimulationRequest {
            entry_speed,
            block_length: 2000.0,
            start_offset: 0.0,
            end_offset: 2000.0,
            speed_limits: limits,
            rolling_stock,
            comfort: Comfort::Standard,
            max_exit_speed,
            time_step: 1.0,
        }
    }

    #[test]
    fn test_cruise_at_entry_speed() {
        let rs = rolling_stock();
        let limits = [SpeedSection {
            start: 0.0,
            end: 2000.0,
            speed: 20.0,
        }];
        let envelope = MaxEffortSimulator
            .simulate(&request(&rs, &limits, 20.0, None))
            .expect("simulation");
        assert!((envelope.total_time() - 100.0).abs() < 1e-6);
        assert!((envelope.end_speed() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_exceeds_limits() {
        let rs = rolling_stock();
        let limits = [
            SpeedSection {
                start: 0.0,
                end: 1000.0,
                speed: 30.0,
            },
            SpeedSection {
                start: 1000.0,
                end: 1500.0,
                speed: 10.0,
            },
        ];
        let envelope = MaxEffortSimulator
            .simulate(&request(&rs, &limits, 0.0, Some(0.0)))
            .expect("simulation");
        for (x, v, _) in envelope.points() {
            assert!(v <= limit_at(&limits, rs.max_speed, x) + 1e-9);
        }
        assert!(envelope.speed_at(1200.0) <= 10.0 + 1e-9);
        assert_eq!(envelope.end_speed(), 0.0);
        assert_eq!(envelope.begin_speed(), 0.0);
    }

    #[test]
    fn test_entry_speed_lowered_when_braking_is_impossible() {
        let rs = rolling_stock();
        let limits = [SpeedSection {
            start: 0.0,
            end: 2000.0,
            speed: 10.0,
        }];
        let envelope = MaxEffortSimulator
            .simulate(&request(&rs, &limits, 25.0, None))
            .expect("simulation");
        assert!((envelope.begin_speed() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_hop_between_standstills() {
        let rs = rolling_stock();
        let mut req = request(&rs, &[], 0.0, Some(0.0));
        req.end_offset = 50.0;
        let envelope = MaxEffortSimulator.simulate(&req).expect("simulation");

        // Accelerate over 25 m, brake over 25 m
        assert_eq!(envelope.begin_speed(), 0.0);
        assert_eq!(envelope.end_speed(), 0.0);
        assert!((envelope.speed_at(25.0) - 5.0).abs() < 1e-9);
        assert!((envelope.total_time() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_segment() {
        let rs = rolling_stock();
        let mut req = request(&rs, &[], 0.0, None);
        req.end_offset = 2500.0;
        assert!(matches!(
            MaxEffortSimulator.simulate(&req),
            Err(SimulationError::InvalidSegment { .. })
        ));
    }
}
