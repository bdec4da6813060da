use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Speed;

/// Search tuning, independent from the request itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdcmConfig {
    /// Longest chain of edges a single backtracking repair may rebuild
    pub max_backtracking_depth: usize,
    /// How many distinct free windows are kept per candidate block
    pub max_delay_openings: usize,
    /// Allow slowing the previous edge down instead of failing
    pub engineering_allowance: bool,
    /// Engineering allowances never slow the train below this speed
    pub engineering_min_speed: Speed,
    pub budget: SearchBudget,
}

impl Default for StdcmConfig {
    fn default() -> Self {
        Self {
            max_backtracking_depth: 10,
            max_delay_openings: 8,
            engineering_allowance: true,
            engineering_min_speed: 30.0 / 3.6,
            budget: SearchBudget::default(),
        }
    }
}

/// Bounds on the search itself, checked between node expansions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    pub max_expansions: Option<usize>,
    pub timeout_secs: Option<f64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_expansions: Some(200_000),
            timeout_secs: None,
        }
    }
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self {
            max_expansions: None,
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}
