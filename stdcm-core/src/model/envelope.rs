//! Speed / position curves with constant acceleration between points.
//!
//! Envelopes are immutable once built. Time is derived from the speed
//! profile: between two points `(x0, v0)` and `(x1, v1)` the train needs
//! `2 * (x1 - x0) / (v0 + v1)` seconds.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::{Distance, Speed, Time};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    positions: Vec<Distance>,
    speeds: Vec<Speed>,
    /// Cumulative time since the first point
    times: Vec<Time>,
}

impl Envelope {
    /// Builds an envelope from matching position and speed samples.
    ///
    /// # Errors
    ///
    /// Fails when there are fewer than two points, when positions do not
    /// strictly increase, or when two consecutive speeds are both zero.
    pub fn from_points(
        positions: Vec<Distance>,
        speeds: Vec<Speed>,
    ) -> Result<Self, SimulationError> {
        if positions.len() < 2 || positions.len() != speeds.len() {
            return Err(SimulationError::EmptyEnvelope);
        }

        let mut times = Vec::with_capacity(positions.len());
        times.push(0.0);
        let mut elapsed = 0.0;
        for ((x0, x1), (v0, v1)) in positions
            .iter()
            .tuple_windows()
            .zip(speeds.iter().tuple_windows())
        {
            let dx = x1 - x0;
            if dx <= 0.0 {
                return Err(SimulationError::NonIncreasingPositions);
            }
            let speed_sum = v0 + v1;
            if speed_sum <= 0.0 {
                return Err(SimulationError::Stalled(*x0));
            }
            elapsed += 2.0 * dx / speed_sum;
            times.push(elapsed);
        }

        Ok(Self {
            positions,
            speeds,
            times,
        })
    }

    pub fn begin_speed(&self) -> Speed {
        self.speeds[0]
    }

    pub fn end_speed(&self) -> Speed {
        self.speeds[self.speeds.len() - 1]
    }

    pub fn begin_position(&self) -> Distance {
        self.positions[0]
    }

    pub fn end_position(&self) -> Distance {
        self.positions[self.positions.len() - 1]
    }

    pub fn total_distance(&self) -> Distance {
        self.end_position() - self.begin_position()
    }

    pub fn total_time(&self) -> Time {
        self.times[self.times.len() - 1]
    }

    pub fn max_speed(&self) -> Speed {
        self.speeds.iter().copied().fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// `(position, speed, time)` for every point of the envelope
    pub fn points(&self) -> impl Iterator<Item = (Distance, Speed, Time)> + '_ {
        self.positions
            .iter()
            .zip(&self.speeds)
            .zip(&self.times)
            .map(|((&x, &v), &t)| (x, v, t))
    }

    /// Index of the segment holding `position`, clamped to the envelope
    fn segment_index(&self, position: Distance) -> usize {
        let idx = self.positions.partition_point(|&x| x <= position);
        idx.clamp(1, self.positions.len() - 1) - 1
    }

    /// Speed at the given position, assuming constant acceleration inside a segment
    pub fn speed_at(&self, position: Distance) -> Speed {
        let position = position.clamp(self.begin_position(), self.end_position());
        let i = self.segment_index(position);
        let (x0, x1) = (self.positions[i], self.positions[i + 1]);
        let (v0, v1) = (self.speeds[i], self.speeds[i + 1]);
        let ratio = (position - x0) / (x1 - x0);
        (v0 * v0 + (v1 * v1 - v0 * v0) * ratio).max(0.0).sqrt()
    }

    /// Time elapsed since the envelope start when reaching `position`
    pub fn time_at(&self, position: Distance) -> Time {
        let position = position.clamp(self.begin_position(), self.end_position());
        let i = self.segment_index(position);
        let v0 = self.speeds[i];
        let v = self.speed_at(position);
        let dx = position - self.positions[i];
        if dx <= 0.0 {
            return self.times[i];
        }
        self.times[i] + 2.0 * dx / (v0 + v)
    }

    /// Slower variant of this envelope where the train does not exceed `cap`
    /// except where it has to: it still starts and ends at the original
    /// speeds, braking down to the cap and accelerating back up within the
    /// given rates. The result never goes faster than the original.
    ///
    /// # Errors
    ///
    /// Fails when the capped profile stalls, which only happens with a
    /// non-positive cap.
    pub fn with_speed_cap(
        &self,
        cap: Speed,
        acceleration: f64,
        deceleration: f64,
    ) -> Result<Envelope, SimulationError> {
        let begin = self.begin_position();
        let end = self.end_position();
        let v_begin = self.begin_speed();
        let v_end = self.end_speed();

        let speeds = self
            .positions
            .iter()
            .zip(&self.speeds)
            .map(|(&x, &v)| {
                let braking_from_start = (v_begin * v_begin - 2.0 * deceleration * (x - begin))
                    .max(0.0)
                    .sqrt();
                let accelerating_to_end = (v_end * v_end - 2.0 * acceleration * (end - x))
                    .max(0.0)
                    .sqrt();
                v.min(cap.max(braking_from_start).max(accelerating_to_end))
            })
            .collect();

        Envelope::from_points(self.positions.clone(), speeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_constant_speed_time() {
        let envelope = Envelope::from_points(vec![0.0, 500.0, 1000.0], vec![20.0, 20.0, 20.0])
            .expect("valid envelope");
        assert!(approx(envelope.total_time(), 50.0));
        assert!(approx(envelope.time_at(250.0), 12.5));
        assert!(approx(envelope.total_distance(), 1000.0));
    }

    #[test]
    fn test_uniform_acceleration_time() {
        // v^2 = 2 * a * x with a = 1
        let envelope =
            Envelope::from_points(vec![0.0, 50.0], vec![0.0, 10.0]).expect("valid envelope");
        assert!(approx(envelope.total_time(), 10.0));
        assert!(approx(envelope.speed_at(12.5), 5.0));
        assert!(approx(envelope.time_at(12.5), 5.0));
    }

    #[test]
    fn test_rejects_stalled_train() {
        let err = Envelope::from_points(vec![0.0, 10.0, 20.0], vec![5.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err, SimulationError::Stalled(10.0));
    }

    #[test]
    fn test_rejects_single_point() {
        let err = Envelope::from_points(vec![0.0], vec![5.0]).unwrap_err();
        assert_eq!(err, SimulationError::EmptyEnvelope);
    }

    #[test]
    fn test_speed_cap_keeps_boundary_speeds() {
        let positions: Vec<f64> = (0..=20).map(|i| f64::from(i) * 100.0).collect();
        let speeds = vec![30.0; positions.len()];
        let envelope = Envelope::from_points(positions, speeds).expect("valid envelope");

        let capped = envelope.with_speed_cap(10.0, 0.5, 0.5).expect("valid cap");
        assert!(approx(capped.begin_speed(), 30.0));
        assert!(approx(capped.end_speed(), 30.0));
        assert!(capped.total_time() > envelope.total_time());
        for ((_, capped_speed, _), (_, speed, _)) in capped.points().zip(envelope.points()) {
            assert!(capped_speed <= speed + 1e-9);
        }
    }
}
