//! Data model for STDCM requests
//!
//! Train performance, speed envelopes, the request itself and search tuning.

pub mod config;
pub mod envelope;
pub mod request;
pub mod rolling_stock;

pub use config::{SearchBudget, StdcmConfig};
pub use envelope::Envelope;
pub use request::{AllowanceValue, StdcmRequest, StdcmStep, StepLocation, TimeWindow};
pub use rolling_stock::{Comfort, RollingStock};
