// Error types for chassis construction, control and telemetry

use crate::drive::Side;
use crate::hardware::HardwareError;

#[derive(Debug, thiserror::Error)]
pub enum ChassisError {
    /// Bad geometry, wiring or topology. Raised while building the chassis, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{operation} is not supported: {reason}")]
    Unsupported { operation: &'static str, reason: String },

    #[error("The {side} tracker slot is not configured and cannot be read")]
    InactiveTracker { side: Side },

    #[error("Inertial sensor calibration failed: {0}")]
    Calibration(String),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChassisError>;
