use serde::{Deserialize, Serialize};

use crate::Speed;

/// Comfort mode, auxiliary systems take part of the traction power
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comfort {
    #[default]
    Standard,
    AirConditioning,
    Heating,
}

/// Performance envelope of the train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStock {
    pub name: String,
    /// Maximum speed in m/s
    pub max_speed: Speed,
    /// Maximum acceleration in m/s²
    pub acceleration: f64,
    /// Service braking deceleration in m/s² (positive)
    pub deceleration: f64,
    /// Share of the traction power used by comfort systems
    #[serde(default)]
    pub auxiliary_power_share: f64,
}

impl RollingStock {
    /// Available acceleration once comfort systems are powered
    pub fn acceleration(&self, comfort: Comfort) -> f64 {
        match comfort {
            Comfort::Standard => self.acceleration,
            Comfort::AirConditioning | Comfort::Heating => {
                self.acceleration * (1.0 - self.auxiliary_power_share.clamp(0.0, 0.9))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comfort_reduces_acceleration() {
        let rolling_stock = RollingStock {
            name: "regional".to_string(),
            max_speed: 44.0,
            acceleration: 0.5,
            deceleration: 0.6,
            auxiliary_power_share: 0.2,
        };
        assert!((rolling_stock.acceleration(Comfort::Standard) - 0.5).abs() < 1e-9);
        assert!((rolling_stock.acceleration(Comfort::Heating) - 0.4).abs() < 1e-9);
    }
}
