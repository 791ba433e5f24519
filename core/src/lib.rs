//! Fingerprint aggregation and k-nearest-neighbour positioning core.
//!
//! Raw calibration captures are grouped, merged and vectorised into immutable cache
//! generations; live measurements are resolved against the newest generation and
//! matched through a k-d tree or a brute-force scan.

pub mod data;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod service;
pub mod telemetry;

pub use prelude::{FingerprintEngine, FingerprintError, FingerprintResult, FingerprintingConfig};
