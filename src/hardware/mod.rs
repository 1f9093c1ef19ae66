// Device contracts the drivetrain consumes
//
// The chassis never talks to a bus directly. Everything it needs from a motor,
// tracking sensor, IMU or controller goes through the traits below, so the
// same chassis code runs against real drivers, the simulator or test fakes.

pub mod keyboard;
pub mod sim;

use serde::{Deserialize, Serialize};

use crate::drive::{GearCartridge, PortSpec};

/// Failures reported by the device layer. The chassis passes these through untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    #[error("No device responding on port {port}")]
    Disconnected { port: u8 },

    #[error("Timeout waiting for device on port {port}")]
    Timeout { port: u8 },

    #[error("Port {port} is already claimed by another device")]
    PortInUse { port: u8 },

    #[error("Device on port {port} reported: {reason}")]
    Device { port: u8, reason: String },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// What a motor does when commanded to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeMode {
    #[default]
    Coast,
    Brake,
    Hold,
}

/// Unit the motor's internal encoder reports in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderUnits {
    Degrees,
    Rotations,
    #[default]
    Counts,
}

/// Analog stick axes on the operator controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY];

    pub(crate) fn index(self) -> usize {
        match self {
            Axis::LeftX => 0,
            Axis::LeftY => 1,
            Axis::RightX => 2,
            Axis::RightY => 3,
        }
    }
}

/// Smart motor with an integrated encoder
pub trait Motor {
    fn port(&self) -> PortSpec;

    /// Open-loop voltage command in millivolts
    fn move_voltage(&mut self, millivolts: i32) -> Result<()>;

    /// Closed-loop (motor-internal) velocity command in ticks per second
    fn move_velocity(&mut self, ticks_per_second: i32) -> Result<()>;

    /// Stop, honoring the configured brake mode
    fn brake(&mut self) -> Result<()>;

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<()>;
    fn set_encoder_units(&mut self, units: EncoderUnits) -> Result<()>;

    /// Accumulated encoder ticks
    fn position(&mut self) -> Result<i32>;
    /// Measured velocity in ticks per second
    fn velocity(&mut self) -> Result<f64>;
    /// Zero the integrated encoder
    fn tare_position(&mut self) -> Result<()>;

    fn voltage(&mut self) -> Result<i32>; // mV
    fn current(&mut self) -> Result<i32>; // mA
}

/// Two-wire quadrature encoder on the legacy (ADI) ports
pub trait QuadratureEncoder {
    /// Accumulated ticks, reversal already applied by the driver
    fn value(&mut self) -> Result<i32>;
    fn reset(&mut self) -> Result<()>;
}

/// Absolute rotation sensor on a smart port
pub trait RotationSensor {
    /// Accumulated position in centidegrees
    fn position(&mut self) -> Result<i32>;
    /// Angular velocity in centidegrees per second
    fn velocity(&mut self) -> Result<i32>;
    fn reset_position(&mut self) -> Result<()>;
}

pub trait InertialSensor {
    /// Kick off gyro calibration; completion is polled with `is_calibrating`
    fn start_calibration(&mut self) -> Result<()>;
    fn is_calibrating(&mut self) -> Result<bool>;
    /// Heading in degrees, [0, 360)
    fn heading(&mut self) -> Result<f64>;
    fn reset_heading(&mut self) -> Result<()>;
}

/// Operator input. Samples are in `-JOYSTICK_MAX..=JOYSTICK_MAX`.
pub trait ControllerInput {
    fn analog(&mut self, axis: Axis) -> Result<i32>;
}

/// Wiring of a quadrature encoder, optionally behind a port expander
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadratureWiring {
    pub top: u8,
    pub bottom: u8,
    pub expander: Option<u8>,
    pub reversed: bool,
}

/// Builds device handles from port assignments
pub trait DeviceFactory {
    fn motor(&mut self, port: PortSpec, cartridge: GearCartridge) -> Result<Box<dyn Motor>>;
    fn quadrature_encoder(&mut self, wiring: QuadratureWiring) -> Result<Box<dyn QuadratureEncoder>>;
    fn rotation_sensor(&mut self, port: PortSpec) -> Result<Box<dyn RotationSensor>>;
    fn inertial_sensor(&mut self, port: u8) -> Result<Box<dyn InertialSensor>>;
}
