// Value types passed between the control law, the chassis and the runtime

use serde::{Deserialize, Serialize};

use crate::drive::Corner;

/// Output for one motor group on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorCommand {
    /// Stop and let the brake mode take over
    #[default]
    Stop,
    /// Scaled output: millivolts in voltage mode, ticks/s in velocity mode
    Output(i32),
}

impl MotorCommand {
    pub fn output(&self) -> i32 {
        match self {
            MotorCommand::Stop => 0,
            MotorCommand::Output(value) => *value,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, MotorCommand::Stop)
    }
}

/// Left/right commands produced by tank and arcade control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SideCommands {
    pub left: MotorCommand,
    pub right: MotorCommand,
}

impl SideCommands {
    pub fn stop() -> Self {
        Self::default()
    }
}

/// One motor group's command from holonomic control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerCommand {
    pub corner: Corner,
    pub command: MotorCommand,
}

/// Which control law the runtime runs each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    Tank,
    Arcade,
    Holonomic,
}

/// Whether scaled stick output is sent as voltage or velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    #[default]
    Voltage,
    Velocity,
}

/// Telemetry for one tracking side. `None` means the backing sensor can't report it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SideTelemetry {
    pub ticks: i32,
    pub inches: f64,
    pub velocity: Option<f64>,
    pub voltage_mv: Option<i32>,
    pub current_ma: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisTelemetry {
    pub left: SideTelemetry,
    pub right: SideTelemetry,
    pub center: Option<SideTelemetry>,
    pub heading: f64,
}

/// Health status reported by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    Fault,
}
