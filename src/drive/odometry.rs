// Odometry sources
// Each side's position feedback comes from exactly one of: the side's sensored
// drive motor, a quadrature encoder, or a rotation sensor. Queries dispatch on
// whichever was wired at construction.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::geometry::TickConstants;
use super::motor_group::MotorGroup;
use super::port::{PortConfig, PortSpec};
use super::topology::Side;
use crate::error::{ChassisError, Result};
use crate::hardware::{DeviceFactory, QuadratureEncoder, QuadratureWiring, RotationSensor};

/// Rotation sensors report centidegrees
const CENTIDEGREES_PER_REV: f64 = 36_000.0;

/// Tracker wiring as written in a config file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerConfig {
    /// Use the first motor of the side's drive group
    #[default]
    MotorEncoder,
    /// `ports` is `[top, bottom]`; the top port's sign sets reversal
    Quadrature {
        ports: Vec<PortConfig>,
        #[serde(default)]
        expander: Option<u8>,
    },
    Rotation { port: PortConfig },
}

impl TrackerConfig {
    pub fn is_external(&self) -> bool {
        !matches!(self, TrackerConfig::MotorEncoder)
    }

    /// Resolve quadrature wiring, checking the port pair
    pub fn quadrature_wiring(ports: &[PortConfig], expander: Option<u8>) -> Result<QuadratureWiring> {
        let [top, bottom] = ports else {
            return Err(ChassisError::Configuration(format!(
                "a quadrature encoder needs exactly 2 ports, got {}",
                ports.len()
            )));
        };
        let (top, bottom) = (PortSpec::from(*top), PortSpec::from(*bottom));
        Ok(QuadratureWiring {
            top: top.index,
            bottom: bottom.index,
            expander,
            reversed: top.reversed,
        })
    }
}

/// Kind of sensor backing a side, for logs and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    MotorEncoder,
    Quadrature,
    Rotation,
}

pub enum OdometrySource {
    MotorEncoder,
    Quadrature(Box<dyn QuadratureEncoder>),
    Rotation(Box<dyn RotationSensor>),
}

impl fmt::Debug for OdometrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

impl OdometrySource {
    pub fn build(config: &TrackerConfig, devices: &mut dyn DeviceFactory) -> Result<Self> {
        Ok(match config {
            TrackerConfig::MotorEncoder => OdometrySource::MotorEncoder,
            TrackerConfig::Quadrature { ports, expander } => {
                let wiring = TrackerConfig::quadrature_wiring(ports, *expander)?;
                OdometrySource::Quadrature(devices.quadrature_encoder(wiring)?)
            }
            TrackerConfig::Rotation { port } => OdometrySource::Rotation(devices.rotation_sensor((*port).into())?),
        })
    }

    pub fn kind(&self) -> TrackerKind {
        match self {
            OdometrySource::MotorEncoder => TrackerKind::MotorEncoder,
            OdometrySource::Quadrature(_) => TrackerKind::Quadrature,
            OdometrySource::Rotation(_) => TrackerKind::Rotation,
        }
    }

    fn position(&mut self, side: Side, sensored: Option<&mut MotorGroup>, ticks: &TickConstants) -> Result<i32> {
        match self {
            OdometrySource::MotorEncoder => Ok(sensored_group(side, sensored)?.position()?),
            OdometrySource::Quadrature(encoder) => Ok(encoder.value()?),
            OdometrySource::Rotation(sensor) => {
                let centidegrees = sensor.position()?;
                Ok(centidegrees_to_ticks(centidegrees as f64, ticks).round() as i32)
            }
        }
    }

    fn velocity(&mut self, side: Side, sensored: Option<&mut MotorGroup>, ticks: &TickConstants) -> Result<f64> {
        match self {
            OdometrySource::MotorEncoder => Ok(sensored_group(side, sensored)?.velocity()?),
            OdometrySource::Quadrature(_) => Err(ChassisError::Unsupported {
                operation: "velocity",
                reason: format!("the {side} quadrature encoder only reports position"),
            }),
            OdometrySource::Rotation(sensor) => Ok(centidegrees_to_ticks(sensor.velocity()? as f64, ticks)),
        }
    }

    fn zero(&mut self, side: Side, sensored: Option<&mut MotorGroup>) -> Result<()> {
        match self {
            OdometrySource::MotorEncoder => sensored_group(side, sensored)?.tare_position()?,
            OdometrySource::Quadrature(encoder) => encoder.reset()?,
            OdometrySource::Rotation(sensor) => sensor.reset_position()?,
        }
        Ok(())
    }
}

fn centidegrees_to_ticks(centidegrees: f64, ticks: &TickConstants) -> f64 {
    centidegrees * ticks.ticks_per_revolution / CENTIDEGREES_PER_REV
}

fn sensored_group(side: Side, group: Option<&mut MotorGroup>) -> Result<&mut MotorGroup> {
    group.ok_or(ChassisError::InactiveTracker { side })
}

/// Per-side odometry with the tick constants each side reports in
#[derive(Debug)]
pub struct Odometry {
    left: OdometrySource,
    right: OdometrySource,
    center: Option<OdometrySource>,
    /// Motor-encoder sides count in drive-wheel ticks
    drive_ticks: TickConstants,
    /// External trackers count in tracking-wheel ticks
    tracker_ticks: TickConstants,
}

impl Odometry {
    pub fn new(
        left: OdometrySource,
        right: OdometrySource,
        center: Option<OdometrySource>,
        drive_ticks: TickConstants,
        tracker_ticks: TickConstants,
    ) -> Self {
        Self {
            left,
            right,
            center,
            drive_ticks,
            tracker_ticks,
        }
    }

    pub fn is_active(&self, side: Side) -> bool {
        side != Side::Center || self.center.is_some()
    }

    pub fn kind(&self, side: Side) -> Option<TrackerKind> {
        match side {
            Side::Left => Some(self.left.kind()),
            Side::Right => Some(self.right.kind()),
            Side::Center => self.center.as_ref().map(OdometrySource::kind),
        }
    }

    /// Tick constants that apply to `side`'s readings
    pub fn ticks_for(&self, side: Side) -> TickConstants {
        match self.kind(side) {
            Some(TrackerKind::MotorEncoder) | None => self.drive_ticks,
            Some(_) => self.tracker_ticks,
        }
    }

    fn slot(&mut self, side: Side) -> Option<&mut OdometrySource> {
        match side {
            Side::Left => Some(&mut self.left),
            Side::Right => Some(&mut self.right),
            Side::Center => self.center.as_mut(),
        }
    }

    fn active_slot(&mut self, side: Side) -> Result<(&mut OdometrySource, TickConstants)> {
        let ticks = self.ticks_for(side);
        match self.slot(side) {
            Some(source) => Ok((source, ticks)),
            None => {
                error!("Read of the inactive {} tracker slot", side);
                Err(ChassisError::InactiveTracker { side })
            }
        }
    }

    /// Position in ticks
    pub fn read(&mut self, side: Side, sensored: Option<&mut MotorGroup>) -> Result<i32> {
        let (source, ticks) = self.active_slot(side)?;
        source.position(side, sensored, &ticks)
    }

    /// Velocity in ticks per second
    pub fn read_velocity(&mut self, side: Side, sensored: Option<&mut MotorGroup>) -> Result<f64> {
        let (source, ticks) = self.active_slot(side)?;
        source.velocity(side, sensored, &ticks)
    }

    /// Zero the backing sensor. An unconfigured side is reported but not fatal.
    pub fn zero(&mut self, side: Side, sensored: Option<&mut MotorGroup>) -> Result<()> {
        let Some(source) = self.slot(side) else {
            return Err(ChassisError::Unsupported {
                operation: "zero",
                reason: format!("no {side} tracker is configured"),
            });
        };
        debug!("Zeroing {} tracker ({:?})", side, source.kind());
        source.zero(side, sensored)
    }
}
