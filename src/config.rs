// Loop timing, controller range, motor limits, and the chassis description file
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drive::{
    CartridgeSetting, ControllerMapping, Corner, DrivetrainTopology, PortConfig, PortSpec, TrackerConfig,
    TrackerGeometry,
};
use crate::error::{ChassisError, Result};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Log a telemetry snapshot once a second
pub const TELEMETRY_EVERY_TICKS: u64 = LOOP_HZ;

// Controller sticks report -127..=127
pub const JOYSTICK_MAX: i32 = 127;

// Motor electrical limit, millivolts
pub const MAX_VOLTAGE_MV: i32 = 12_000;

pub const DEFAULT_DEADBAND: i32 = 5;

// Gyro calibration must finish within this window or construction fails
pub const IMU_CALIBRATION_TIMEOUT: Duration = Duration::from_secs(3);
pub const IMU_POLL_INTERVAL: Duration = Duration::from_millis(10);

// Keyboard sticks spring back to centre after this long without a key
pub const KEYBOARD_INPUT_TIMEOUT: Duration = Duration::from_millis(100);

/// Drive wheel as mounted on the motors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub diameter: f64,
    #[serde(default = "unit_ratio")]
    pub gear_ratio: f64,
    pub cartridge: CartridgeSetting,
}

fn unit_ratio() -> f64 {
    1.0
}

/// Which sensor tracks each side
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub left: TrackerConfig,
    pub right: TrackerConfig,
    pub center: Option<TrackerConfig>,
    /// Independent tracking wheel; the drive wheel is reused when absent
    pub wheel: Option<TrackerGeometry>,
}

/// Everything needed to build a chassis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChassisConfig {
    pub topology: DrivetrainTopology,
    pub motors: BTreeMap<Corner, Vec<PortConfig>>,
    pub inertial_port: u8,
    pub wheel: WheelConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub controller: ControllerMapping,
    #[serde(default = "default_calibration_timeout_ms")]
    pub imu_calibration_timeout_ms: u64,
}

fn default_calibration_timeout_ms() -> u64 {
    IMU_CALIBRATION_TIMEOUT.as_millis() as u64
}

impl ChassisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.imu_calibration_timeout_ms)
    }

    /// Tracker for the centre slot, if any. H drives fall back to the centre motor group.
    pub fn center_tracker(&self) -> Result<Option<TrackerConfig>> {
        let has_center_group = self.topology.corners().contains(&Corner::Center);
        match &self.tracking.center {
            Some(TrackerConfig::MotorEncoder) if !has_center_group => Err(ChassisError::Configuration(format!(
                "{:?} has no centre motor group to track with",
                self.topology
            ))),
            Some(tracker) => Ok(Some(tracker.clone())),
            None if has_center_group => Ok(Some(TrackerConfig::MotorEncoder)),
            None => Ok(None),
        }
    }

    /// Check wiring before any device is opened
    pub fn validate(&self) -> Result<()> {
        let corners: Vec<Corner> = self.motors.keys().copied().collect();
        self.topology.validate_corners(&corners)?;
        self.center_tracker()?;

        let mut smart = BTreeSet::new();
        let mut claim_smart = |port: u8, what: &str| -> Result<()> {
            if port == 0 {
                return Err(ChassisError::Configuration(format!("{what} is on port 0")));
            }
            if !smart.insert(port) {
                return Err(ChassisError::Configuration(format!("{what} reuses port {port}")));
            }
            Ok(())
        };

        for (corner, ports) in &self.motors {
            for port in ports {
                claim_smart(PortSpec::from(*port).index, &format!("{corner} motor"))?;
            }
        }
        claim_smart(self.inertial_port, "inertial sensor")?;

        let trackers = [Some(&self.tracking.left), Some(&self.tracking.right), self.tracking.center.as_ref()];
        let mut expanders = BTreeSet::new();
        let mut adi = BTreeSet::new();
        for tracker in trackers.into_iter().flatten() {
            match tracker {
                TrackerConfig::MotorEncoder => {}
                TrackerConfig::Rotation { port } => claim_smart(PortSpec::from(*port).index, "rotation sensor")?,
                TrackerConfig::Quadrature { ports, expander } => {
                    let wiring = TrackerConfig::quadrature_wiring(ports, *expander)?;
                    for wire in [wiring.top, wiring.bottom] {
                        if wire == 0 {
                            return Err(ChassisError::Configuration("quadrature encoder wired to port 0".into()));
                        }
                        if !adi.insert((wiring.expander, wire)) {
                            return Err(ChassisError::Configuration(format!(
                                "quadrature port {wire} is used twice on the same expander"
                            )));
                        }
                    }
                    if let Some(expander) = wiring.expander {
                        expanders.insert(expander);
                    }
                }
            }
        }
        // Several encoders can share one expander
        for expander in expanders {
            claim_smart(expander, "port expander")?;
        }
        Ok(())
    }

    /// Six-motor tank drive on 3.25" wheels, motor-encoder tracking
    pub fn default_tank() -> Self {
        let group = |ports: [i8; 3]| ports.into_iter().map(PortConfig::Signed).collect();
        Self {
            topology: DrivetrainTopology::Tank,
            motors: BTreeMap::from([(Corner::Left, group([-1, -2, 3])), (Corner::Right, group([4, 5, -6]))]),
            inertial_port: 10,
            wheel: WheelConfig {
                diameter: 3.25,
                gear_ratio: 1.0,
                cartridge: CartridgeSetting::Named(crate::drive::GearCartridge::Mid),
            },
            tracking: TrackingConfig::default(),
            controller: ControllerMapping::default(),
            imu_calibration_timeout_ms: default_calibration_timeout_ms(),
        }
    }
}
