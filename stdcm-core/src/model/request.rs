//! STDCM request: the train, where it has to go and when.

use serde::{Deserialize, Serialize};

use super::rolling_stock::{Comfort, RollingStock};
use crate::{BlockId, Distance, TIME_EPSILON, Time};

/// A point on the infrastructure, as an offset from the block entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepLocation {
    pub block: BlockId,
    pub offset: Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Time,
    pub end: Time,
}

impl TimeWindow {
    /// Bounds included, up to [`TIME_EPSILON`]
    pub fn contains(&self, time: Time) -> bool {
        time >= self.start - TIME_EPSILON && time <= self.end + TIME_EPSILON
    }
}

/// Waypoint of the request. Reaching any of its locations satisfies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdcmStep {
    pub locations: Vec<StepLocation>,
    /// Present when the train stops there, for that long
    #[serde(default)]
    pub stop_duration: Option<Time>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

impl StdcmStep {
    pub fn passage(locations: Vec<StepLocation>) -> Self {
        Self {
            locations,
            stop_duration: None,
            time_window: None,
        }
    }

    pub fn stop(locations: Vec<StepLocation>, duration: Time) -> Self {
        Self {
            locations,
            stop_duration: Some(duration),
            time_window: None,
        }
    }

    #[must_use]
    pub fn with_time_window(mut self, start: Time, end: Time) -> Self {
        self.time_window = Some(TimeWindow { start, end });
        self
    }

    pub fn is_stop(&self) -> bool {
        self.stop_duration.is_some()
    }
}

/// Schedule margin, expressed the way timetable designers write it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AllowanceValue {
    /// Percentage of the running time
    Percentage(f64),
    /// Minutes per 100 km
    TimePerDistance(f64),
    /// Seconds, regardless of the distance
    FixedTime(Time),
}

impl AllowanceValue {
    /// Extra time to add, relative to the given running time
    pub fn allowance_ratio(&self, run_time: Time, distance: Distance) -> f64 {
        match *self {
            AllowanceValue::Percentage(percentage) => percentage / 100.0,
            AllowanceValue::TimePerDistance(minutes_per_100km) => {
                if run_time <= 0.0 {
                    return 0.0;
                }
                minutes_per_100km * 60.0 * distance / 100_000.0 / run_time
            }
            AllowanceValue::FixedTime(time) => {
                if run_time <= 0.0 {
                    return 0.0;
                }
                time / run_time
            }
        }
    }
}

fn default_time_step() -> Time {
    2.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdcmRequest {
    pub rolling_stock: RollingStock,
    #[serde(default)]
    pub comfort: Comfort,
    /// Simulation time step in seconds
    #[serde(default = "default_time_step")]
    pub time_step: Time,
    /// Origin first, destination last
    pub steps: Vec<StdcmStep>,
    pub max_run_time: Time,
    /// Earliest departure
    pub min_schedule_time_start: Time,
    /// How late the train may leave after `min_schedule_time_start`,
    /// defaults to `max_run_time`
    #[serde(default)]
    pub max_departure_delay: Option<Time>,
    /// Train category, selects tagged speed limits
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub standard_allowance: Option<AllowanceValue>,
}

impl StdcmRequest {
    pub fn new(
        rolling_stock: RollingStock,
        steps: Vec<StdcmStep>,
        min_schedule_time_start: Time,
        max_run_time: Time,
    ) -> Self {
        Self {
            rolling_stock,
            comfort: Comfort::default(),
            time_step: default_time_step(),
            steps,
            max_run_time,
            min_schedule_time_start,
            max_departure_delay: None,
            tag: None,
            standard_allowance: None,
        }
    }

    pub fn max_departure_delay(&self) -> Time {
        self.max_departure_delay.unwrap_or(self.max_run_time)
    }

    /// Nothing may happen after this time
    pub fn search_horizon(&self) -> Time {
        self.min_schedule_time_start + self.max_run_time
    }
}
