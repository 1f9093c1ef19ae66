// Chassis: the drivetrain as one object
//
// Owns the motor groups, tracking sensors, IMU and controller handle. Wiring
// and geometry are fixed at construction; only the drive settings change
// afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::control::{self, AxisScale, ControllerMapping, DeadbandPolicy, StickLayout};
use super::geometry::{DriveGeometry, TickConstants, TrackerGeometry};
use super::motor_group::MotorGroup;
use super::odometry::{Odometry, OdometrySource, TrackerKind};
use super::port::PortSpec;
use super::topology::{Corner, DrivetrainTopology, Side};
use crate::config::{ChassisConfig, IMU_POLL_INTERVAL, JOYSTICK_MAX, MAX_VOLTAGE_MV};
use crate::error::{ChassisError, Result};
use crate::hardware::{Axis, BrakeMode, ControllerInput, DeviceFactory, EncoderUnits, InertialSensor};
use crate::messages::{ChassisTelemetry, CommandMode, CornerCommand, DriveMode, MotorCommand, SideCommands, SideTelemetry};

pub struct Chassis {
    topology: DrivetrainTopology,
    groups: BTreeMap<Corner, MotorGroup>,
    odometry: Odometry,
    imu: Box<dyn InertialSensor>,
    controller: Box<dyn ControllerInput>,
    geometry: DriveGeometry,
    tracker_geometry: TrackerGeometry,
    mapping: ControllerMapping,

    brake_mode: BrakeMode,
    encoder_units: EncoderUnits,
    command_mode: CommandMode,
    max_voltage: i32,
    max_velocity: i32,
}

impl fmt::Debug for Chassis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chassis")
            .field("topology", &self.topology)
            .field("groups", &self.groups)
            .field("odometry", &self.odometry)
            .field("geometry", &self.geometry)
            .field("command_mode", &self.command_mode)
            .finish_non_exhaustive()
    }
}

impl Chassis {
    /// Open every device named in `config` and calibrate the IMU.
    ///
    /// Blocks until calibration finishes. A calibration that outlives the
    /// configured timeout is fatal.
    pub fn new(config: &ChassisConfig, devices: &mut dyn DeviceFactory, controller: Box<dyn ControllerInput>) -> Result<Self> {
        config.validate()?;

        let cartridge = config.wheel.cartridge.resolve()?;
        let geometry = DriveGeometry::new(config.wheel.diameter, config.wheel.gear_ratio, cartridge);
        let tracker_geometry = config
            .tracking
            .wheel
            .unwrap_or_else(|| TrackerGeometry::from(&geometry));
        let drive_ticks = geometry.ticks()?;
        let tracker_ticks = tracker_geometry.ticks(cartridge)?;
        info!(
            "{:?} chassis: {:.2}\" wheels, {} cartridge, {:.2} ticks/inch",
            config.topology, geometry.wheel_diameter, cartridge, drive_ticks.ticks_per_inch
        );

        let mut groups = BTreeMap::new();
        for (&corner, ports) in &config.motors {
            let ports: Vec<PortSpec> = ports.iter().copied().map(PortSpec::from).collect();
            groups.insert(corner, MotorGroup::new(corner, &ports, cartridge, devices)?);
        }

        let left = OdometrySource::build(&config.tracking.left, devices)?;
        let right = OdometrySource::build(&config.tracking.right, devices)?;
        let center = match config.center_tracker()? {
            Some(tracker) => Some(OdometrySource::build(&tracker, devices)?),
            None => None,
        };
        let odometry = Odometry::new(left, right, center, drive_ticks, tracker_ticks);
        info!(
            "Tracking: left={:?} right={:?} center={:?}",
            odometry.kind(Side::Left),
            odometry.kind(Side::Right),
            odometry.kind(Side::Center)
        );

        let mut imu = devices.inertial_sensor(config.inertial_port)?;
        calibrate(imu.as_mut(), config.calibration_timeout())?;

        Ok(Self {
            topology: config.topology,
            groups,
            odometry,
            imu,
            controller,
            geometry,
            tracker_geometry,
            mapping: config.controller.clone(),
            brake_mode: BrakeMode::default(),
            encoder_units: EncoderUnits::default(),
            command_mode: CommandMode::default(),
            max_voltage: MAX_VOLTAGE_MV,
            max_velocity: cartridge.native_ticks() as i32,
        })
    }

    pub fn topology(&self) -> DrivetrainTopology {
        self.topology
    }

    pub fn geometry(&self) -> &DriveGeometry {
        &self.geometry
    }

    pub fn tracker_geometry(&self) -> &TrackerGeometry {
        &self.tracker_geometry
    }

    pub fn controller_mapping(&self) -> &ControllerMapping {
        &self.mapping
    }

    pub fn motor_group(&self, corner: Corner) -> Option<&MotorGroup> {
        self.groups.get(&corner)
    }

    // ---- Control ----

    fn axis(&mut self, axis: Axis) -> Result<i32> {
        Ok(self.controller.analog(axis)?)
    }

    fn scale(&self) -> AxisScale {
        match self.command_mode {
            CommandMode::Voltage => AxisScale::new(JOYSTICK_MAX, self.max_voltage),
            CommandMode::Velocity => AxisScale::new(JOYSTICK_MAX, self.max_velocity),
        }
    }

    /// Run every group, keeping the first failure
    fn command_groups(&mut self, mut command_for: impl FnMut(Corner) -> MotorCommand) -> Result<()> {
        let mode = self.command_mode;
        let mut first_error = None;
        for (&corner, group) in &mut self.groups {
            if let Err(e) = group.apply(command_for(corner), mode) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Drive every group on a side with that side's command. A centre group
    /// is held stopped.
    pub fn apply_sides(&mut self, commands: SideCommands) -> Result<()> {
        self.command_groups(|corner| match corner.side() {
            Side::Left => commands.left,
            Side::Right => commands.right,
            Side::Center => MotorCommand::Stop,
        })
    }

    pub fn apply_corners(&mut self, commands: &[CornerCommand]) -> Result<()> {
        self.command_groups(|corner| {
            commands
                .iter()
                .find(|c| c.corner == corner)
                .map_or(MotorCommand::Stop, |c| c.command)
        })
    }

    /// Left stick to the left side, right stick to the right side
    pub fn tank_control(&mut self) -> Result<SideCommands> {
        let left = self.axis(self.mapping.tank_left)?;
        let right = self.axis(self.mapping.tank_right)?;
        let commands = control::tank(left, right, self.mapping.deadband, self.mapping.tank_policy, self.scale());
        self.apply_sides(commands)?;
        Ok(commands)
    }

    pub fn arcade_control(&mut self) -> Result<SideCommands> {
        let (forward_axis, turn_axis) = self.mapping.arcade.axes();
        let forward = self.axis(forward_axis)?;
        let turn = self.axis(turn_axis)?;
        let commands = control::arcade(forward, turn, self.mapping.deadband, self.mapping.arcade_policy, self.scale());
        self.apply_sides(commands)?;
        Ok(commands)
    }

    /// Forward from the arcade forward axis, plus strafe and rotate
    pub fn holonomic_control(&mut self) -> Result<Vec<CornerCommand>> {
        let (forward_axis, _) = self.mapping.arcade.axes();
        let forward = self.axis(forward_axis)?;
        let strafe = self.axis(self.mapping.strafe)?;
        let rotate = self.axis(self.mapping.rotate)?;
        let commands = control::holonomic(
            self.topology,
            forward,
            strafe,
            rotate,
            self.mapping.deadband,
            self.mapping.holonomic_policy,
            self.scale(),
        )?;
        self.apply_corners(&commands)?;
        Ok(commands)
    }

    /// One tick of the given control mode
    pub fn drive(&mut self, mode: DriveMode) -> Result<()> {
        match mode {
            DriveMode::Tank => self.tank_control().map(|_| ()),
            DriveMode::Arcade => self.arcade_control().map(|_| ()),
            DriveMode::Holonomic => self.holonomic_control().map(|_| ()),
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        self.command_groups(|_| MotorCommand::Stop)
    }

    // ---- Settings ----

    pub fn brake_mode(&self) -> BrakeMode {
        self.brake_mode
    }

    pub fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<()> {
        self.brake_mode = mode;
        for group in self.groups.values_mut() {
            group.set_brake_mode(mode)?;
        }
        Ok(())
    }

    pub fn encoder_units(&self) -> EncoderUnits {
        self.encoder_units
    }

    pub fn set_encoder_units(&mut self, units: EncoderUnits) -> Result<()> {
        self.encoder_units = units;
        for group in self.groups.values_mut() {
            group.set_encoder_units(units)?;
        }
        Ok(())
    }

    pub fn command_mode(&self) -> CommandMode {
        self.command_mode
    }

    pub fn set_command_mode(&mut self, mode: CommandMode) {
        debug!("Command mode {:?}", mode);
        self.command_mode = mode;
    }

    /// Full-scale output in millivolts
    pub fn max_voltage(&self) -> i32 {
        self.max_voltage
    }

    pub fn set_max_voltage(&mut self, millivolts: i32) {
        let clamped = millivolts.clamp(0, MAX_VOLTAGE_MV);
        if clamped != millivolts {
            warn!("Max voltage {} mV out of range, using {} mV", millivolts, clamped);
        }
        self.max_voltage = clamped;
    }

    /// Full-scale output in ticks per second
    pub fn max_velocity(&self) -> i32 {
        self.max_velocity
    }

    pub fn set_max_velocity(&mut self, ticks_per_second: i32) {
        if ticks_per_second < 0 {
            warn!("Negative max velocity {}, using 0", ticks_per_second);
        }
        self.max_velocity = ticks_per_second.max(0);
    }

    pub fn joystick_deadband(&self) -> i32 {
        self.mapping.deadband
    }

    pub fn set_joystick_deadband(&mut self, deadband: i32) {
        let clamped = deadband.clamp(0, JOYSTICK_MAX);
        if clamped != deadband {
            warn!("Deadband {} out of range, using {}", deadband, clamped);
        }
        self.mapping.deadband = clamped;
    }

    pub fn set_deadband_policy(&mut self, mode: DriveMode, policy: DeadbandPolicy) {
        match mode {
            DriveMode::Tank => self.mapping.tank_policy = policy,
            DriveMode::Arcade => self.mapping.arcade_policy = policy,
            DriveMode::Holonomic => self.mapping.holonomic_policy = policy,
        }
    }

    pub fn set_tank_joysticks(&mut self, left: Axis, right: Axis) {
        self.mapping.tank_left = left;
        self.mapping.tank_right = right;
    }

    pub fn set_arcade_layout(&mut self, layout: StickLayout, flipped: bool) {
        self.mapping.arcade.layout = layout;
        self.mapping.arcade.flipped = flipped;
    }

    pub fn set_strafe_joystick(&mut self, axis: Axis) {
        self.mapping.strafe = axis;
    }

    pub fn set_rotate_joystick(&mut self, axis: Axis) {
        self.mapping.rotate = axis;
    }

    // ---- Telemetry ----

    pub fn tracker_kind(&self, side: Side) -> Option<TrackerKind> {
        self.odometry.kind(side)
    }

    /// Tick constants the given side reports in
    pub fn tick_constants(&self, side: Side) -> TickConstants {
        self.odometry.ticks_for(side)
    }

    pub fn ticks_per_revolution(&self, side: Side) -> f64 {
        self.tick_constants(side).ticks_per_revolution
    }

    pub fn ticks_per_inch(&self, side: Side) -> f64 {
        self.tick_constants(side).ticks_per_inch
    }

    /// Position of the side's tracker in ticks
    pub fn sensor_value(&mut self, side: Side) -> Result<i32> {
        let group = sensored_group(&mut self.groups, self.topology, side);
        self.odometry.read(side, group)
    }

    /// Velocity of the side's tracker in ticks per second
    pub fn sensor_velocity(&mut self, side: Side) -> Result<f64> {
        let group = sensored_group(&mut self.groups, self.topology, side);
        self.odometry.read_velocity(side, group)
    }

    /// Distance travelled by the side's wheel.
    ///
    /// Quadrature counts are used as-is, so a quadrature tracker must count
    /// `native(cartridge) * gear_ratio` per tracking-wheel revolution for this
    /// to be in inches. Rotation sensors are converted into that domain.
    pub fn distance_inches(&mut self, side: Side) -> Result<f64> {
        let ticks = self.sensor_value(side)?;
        Ok(self.tick_constants(side).ticks_to_inches(ticks as f64))
    }

    /// Motor behind a motor-encoder tracked side, for electrical telemetry
    fn electrical_source(&mut self, side: Side, operation: &'static str) -> Result<&mut MotorGroup> {
        match self.odometry.kind(side) {
            None => Err(ChassisError::InactiveTracker { side }),
            Some(TrackerKind::MotorEncoder) => {
                sensored_group(&mut self.groups, self.topology, side).ok_or(ChassisError::InactiveTracker { side })
            }
            Some(kind) => Err(ChassisError::Unsupported {
                operation,
                reason: format!("the {side} side is tracked by a {kind:?} sensor with no electrical telemetry"),
            }),
        }
    }

    /// Voltage of the side's sensored motor, mV
    pub fn motor_voltage(&mut self, side: Side) -> Result<i32> {
        Ok(self.electrical_source(side, "motor voltage")?.voltage()?)
    }

    /// Current draw of the side's sensored motor, mA
    pub fn motor_current(&mut self, side: Side) -> Result<i32> {
        Ok(self.electrical_source(side, "motor current")?.current()?)
    }

    /// Heading in degrees, [0, 360)
    pub fn heading(&mut self) -> Result<f64> {
        Ok(self.imu.heading()?)
    }

    pub fn reset_inertial_sensor(&mut self) -> Result<()> {
        Ok(self.imu.reset_heading()?)
    }

    pub fn reset_side(&mut self, side: Side) -> Result<()> {
        let group = sensored_group(&mut self.groups, self.topology, side);
        self.odometry.zero(side, group)
    }

    /// Zero left and right, and centre when it's tracked
    pub fn reset_drive_sensors(&mut self) -> Result<()> {
        self.reset_side(Side::Left)?;
        self.reset_side(Side::Right)?;
        if self.odometry.is_active(Side::Center) {
            self.reset_side(Side::Center)?;
        }
        Ok(())
    }

    fn side_telemetry(&mut self, side: Side) -> Result<SideTelemetry> {
        let ticks = self.sensor_value(side)?;
        Ok(SideTelemetry {
            ticks,
            inches: self.tick_constants(side).ticks_to_inches(ticks as f64),
            velocity: supported(self.sensor_velocity(side))?,
            voltage_mv: supported(self.motor_voltage(side))?,
            current_ma: supported(self.motor_current(side))?,
        })
    }

    /// Snapshot of every active side plus heading
    pub fn telemetry(&mut self) -> Result<ChassisTelemetry> {
        let center = if self.odometry.is_active(Side::Center) {
            Some(self.side_telemetry(Side::Center)?)
        } else {
            None
        };
        Ok(ChassisTelemetry {
            left: self.side_telemetry(Side::Left)?,
            right: self.side_telemetry(Side::Right)?,
            center,
            heading: self.heading()?,
        })
    }
}

impl Drop for Chassis {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop drive motors on shutdown: {}", e);
        }
    }
}

fn sensored_group(
    groups: &mut BTreeMap<Corner, MotorGroup>,
    topology: DrivetrainTopology,
    side: Side,
) -> Option<&mut MotorGroup> {
    topology.sensored_corner(side).and_then(|corner| groups.get_mut(&corner))
}

/// Unsupported becomes `None`; anything else is a real failure
fn supported<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ChassisError::Unsupported { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn calibrate(imu: &mut dyn InertialSensor, timeout: Duration) -> Result<()> {
    info!("Calibrating inertial sensor (timeout {:?})", timeout);
    imu.start_calibration()?;
    let started = Instant::now();
    while imu.is_calibrating()? {
        if started.elapsed() >= timeout {
            return Err(ChassisError::Calibration(format!("still calibrating after {timeout:?}")));
        }
        thread::sleep(IMU_POLL_INTERVAL);
    }
    info!("Inertial sensor calibrated in {:?}", started.elapsed());
    Ok(())
}
