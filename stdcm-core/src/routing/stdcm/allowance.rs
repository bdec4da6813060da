use log::debug;

use super::edge::EdgeId;
use super::graph::StdcmGraph;
use super::node::quantize;
use crate::model::{AllowanceValue, Envelope, StdcmConfig};
use crate::{Speed, TIME_EPSILON, Time};

/// Bisection steps when looking for the speed cap of an engineering allowance
const CAP_SEARCH_ITERATIONS: usize = 40;

/// Result of slowing an envelope down to absorb some time
#[derive(Debug, Clone, PartialEq)]
pub enum EngineeringOutcome {
    /// The returned envelope is `added_time` longer, at least what was asked
    Absorbed { envelope: Envelope, added_time: Time },
    /// Even at the lowest allowed speed this much time is still missing
    Shortfall { shortfall: Time },
}

/// Schedule margins: the path-wide standard allowance, applied as a speed
/// ratio, and local engineering allowances, which slow a single edge down.
#[derive(Debug, Clone, Copy)]
pub struct AllowanceManager {
    standard_allowance: Option<AllowanceValue>,
    engineering_enabled: bool,
    engineering_min_speed: Speed,
}

impl AllowanceManager {
    pub fn new(standard_allowance: Option<AllowanceValue>, config: &StdcmConfig) -> Self {
        Self {
            standard_allowance,
            engineering_enabled: config.engineering_allowance,
            engineering_min_speed: config.engineering_min_speed.max(0.1),
        }
    }

    /// Ratio to apply to the envelope speeds so that the standard allowance
    /// is consumed: `1 / (1 + allowance ratio)`, or 1 without allowance.
    pub fn standard_allowance_speed_ratio(&self, envelope: &Envelope) -> f64 {
        let Some(allowance) = self.standard_allowance else {
            return 1.0;
        };
        let ratio = allowance.allowance_ratio(envelope.total_time(), envelope.total_distance());
        1.0 / (1.0 + ratio)
    }

    /// Slows `envelope` down so that it takes `extra_time` more, keeping its
    /// begin and end speeds and staying under the original curve.
    pub fn engineering_allowance(
        &self,
        envelope: &Envelope,
        extra_time: Time,
        acceleration: f64,
        deceleration: f64,
    ) -> EngineeringOutcome {
        if extra_time <= TIME_EPSILON {
            return EngineeringOutcome::Absorbed {
                envelope: envelope.clone(),
                added_time: 0.0,
            };
        }
        if !self.engineering_enabled || envelope.max_speed() <= self.engineering_min_speed {
            return EngineeringOutcome::Shortfall {
                shortfall: extra_time,
            };
        }

        let base_time = envelope.total_time();
        let capped = |cap: Speed| envelope.with_speed_cap(cap, acceleration, deceleration).ok();

        let Some(slowest) = capped(self.engineering_min_speed) else {
            return EngineeringOutcome::Shortfall {
                shortfall: extra_time,
            };
        };
        let max_gain = slowest.total_time() - base_time;
        if max_gain + TIME_EPSILON < extra_time {
            return EngineeringOutcome::Shortfall {
                shortfall: extra_time - max_gain.max(0.0),
            };
        }

        // Time only grows when the cap goes down: keep the fastest cap that
        // still gains enough
        let mut low = self.engineering_min_speed;
        let mut high = envelope.max_speed();
        let mut best = slowest;
        for _ in 0..CAP_SEARCH_ITERATIONS {
            let mid = 0.5 * (low + high);
            match capped(mid) {
                Some(candidate) if candidate.total_time() - base_time >= extra_time => {
                    low = mid;
                    best = candidate;
                }
                _ => high = mid,
            }
        }

        let added_time = best.total_time() - base_time;
        EngineeringOutcome::Absorbed {
            envelope: best,
            added_time,
        }
    }

    /// Makes the train arrive `extra_time` later at the end of `edge_id` by
    /// running slower on it, once the departure has been shifted by `shift`.
    ///
    /// Returns the slowed copy of the edge, or the time that could not be
    /// absorbed. The same request on the same edge gives the same copy.
    pub(crate) fn try_engineering_allowance(
        &self,
        graph: &mut StdcmGraph<'_>,
        edge_id: EdgeId,
        extra_time: Time,
        shift: Time,
    ) -> Result<EdgeId, Time> {
        let key = (edge_id, quantize(extra_time), quantize(shift));
        if let Some(&slowed) = graph.derived.slowed.get(&key) {
            return slowed;
        }
        let slowed = self.slow_down(graph, edge_id, extra_time, shift);
        graph.derived.slowed.insert(key, slowed);
        slowed
    }

    fn slow_down(
        &self,
        graph: &mut StdcmGraph<'_>,
        edge_id: EdgeId,
        extra_time: Time,
        shift: Time,
    ) -> Result<EdgeId, Time> {
        let edge = &graph.edges[edge_id];
        let slack = edge.delay_before_conflict - shift;
        if extra_time > slack + TIME_EPSILON {
            debug!(
                "Block {} cannot be held {extra_time:.1}s longer, next train in {slack:.1}s",
                edge.block
            );
            return Err(extra_time - slack.max(0.0));
        }

        let rolling_stock = &graph.request.rolling_stock;
        let acceleration = rolling_stock.acceleration(graph.request.comfort);
        let deceleration = rolling_stock.deceleration;
        let ratio = edge.allowance_speed_ratio;

        let (envelope, gained) = match self.engineering_allowance(
            &edge.envelope,
            extra_time * ratio,
            acceleration,
            deceleration,
        ) {
            EngineeringOutcome::Absorbed {
                envelope,
                added_time,
            } => (envelope, added_time / ratio),
            EngineeringOutcome::Shortfall { shortfall } => return Err(shortfall / ratio),
        };

        let mut slowed = edge.clone();
        slowed.envelope = envelope;
        slowed.engineering_time += gained;
        slowed.delay_before_conflict -= gained;
        slowed.max_added_delay_after = slowed
            .max_added_delay_after
            .min(slowed.delay_before_conflict)
            .min(graph.delay_manager.horizon() - slowed.end_time())
            .min(graph.arrival_slack(&slowed));
        if slowed.max_added_delay_after < shift - TIME_EPSILON {
            return Err(shift - slowed.max_added_delay_after);
        }

        debug!(
            "Engineering allowance of {gained:.1}s on block {}",
            slowed.block
        );
        Ok(graph.edges.push(slowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        let positions: Vec<f64> = (0..=40).map(|i| f64::from(i) * 50.0).collect();
        let speeds = vec![25.0; positions.len()];
        Envelope::from_points(positions, speeds).expect("valid envelope")
    }

    fn manager(standard_allowance: Option<AllowanceValue>) -> AllowanceManager {
        AllowanceManager::new(standard_allowance, &StdcmConfig::default())
    }

    #[test]
    fn test_no_standard_allowance() {
        assert_eq!(manager(None).standard_allowance_speed_ratio(&envelope()), 1.0);
    }

    #[test]
    fn test_standard_allowance_ratio() {
        let ratio = manager(Some(AllowanceValue::Percentage(10.0)))
            .standard_allowance_speed_ratio(&envelope());
        assert!((ratio - 1.0 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_time_grows_with_allowance() {
        let envelope = envelope();
        let times: Vec<f64> = [0.0, 5.0, 10.0, 25.0]
            .iter()
            .map(|&p| {
                envelope.total_time()
                    / manager(Some(AllowanceValue::Percentage(p)))
                        .standard_allowance_speed_ratio(&envelope)
            })
            .collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!((times[2] - envelope.total_time() * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_engineering_allowance_absorbs_time() {
        let envelope = envelope();
        match manager(None).engineering_allowance(&envelope, 20.0, 0.5, 0.5) {
            EngineeringOutcome::Absorbed {
                envelope: slowed,
                added_time,
            } => {
                assert!(added_time >= 20.0);
                assert!(added_time < 20.5);
                assert!((slowed.total_time() - envelope.total_time() - added_time).abs() < 1e-9);
                assert_eq!(slowed.begin_speed(), envelope.begin_speed());
                assert_eq!(slowed.end_speed(), envelope.end_speed());
            }
            EngineeringOutcome::Shortfall { .. } => panic!("expected the delay to be absorbed"),
        }
    }

    #[test]
    fn test_engineering_allowance_reports_shortfall() {
        let envelope = envelope();
        match manager(None).engineering_allowance(&envelope, 10_000.0, 0.5, 0.5) {
            EngineeringOutcome::Shortfall { shortfall } => {
                assert!(shortfall > 0.0 && shortfall < 10_000.0);
            }
            EngineeringOutcome::Absorbed { .. } => panic!("the train cannot be that slow"),
        }
    }

    #[test]
    fn test_engineering_allowance_disabled() {
        let config = StdcmConfig {
            engineering_allowance: false,
            ..StdcmConfig::default()
        };
        let manager = AllowanceManager::new(None, &config);
        assert_eq!(
            manager.engineering_allowance(&envelope(), 5.0, 0.5, 0.5),
            EngineeringOutcome::Shortfall { shortfall: 5.0 }
        );
    }
}
