// In-memory device backend
//
// Every handle shares its state with the `SimWorld` that created it, so tests
// and the runtime can inspect commands and inject sensor readings. The
// simulation is single-threaded like the control loop, hence Rc<RefCell<_>>.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::{
    Axis, BrakeMode, ControllerInput, DeviceFactory, EncoderUnits, HardwareError, InertialSensor, Motor,
    QuadratureEncoder, QuadratureWiring, Result, RotationSensor,
};
use crate::config::MAX_VOLTAGE_MV;
use crate::drive::{GearCartridge, PortSpec};

pub type Shared<T> = Rc<RefCell<T>>;

/// Free-running speed of a simulated motor at full voltage, output revolutions per second
const FREE_SPEED_REV_PER_SEC: f64 = 3.0;

/// Rough stall-free current draw at full voltage
const FULL_VOLTAGE_CURRENT_MA: f64 = 2_500.0;

/// +1, or -1 for a reversed port
fn direction(reversed: bool) -> i32 {
    if reversed { -1 } else { 1 }
}

/// Commands are as the caller sent them. Position, velocity and voltage are in
/// the shaft's frame, so a reversed motor reports them with the sign flipped.
#[derive(Debug, Clone)]
pub struct SimMotorState {
    pub port: PortSpec,
    pub reversed: bool,
    pub cartridge: GearCartridge,
    pub voltage_command: Option<i32>,
    pub velocity_command: Option<i32>,
    pub braking: bool,
    pub brake_mode: BrakeMode,
    pub encoder_units: EncoderUnits,
    pub position: i32,
    pub velocity: f64,
    pub voltage: i32,
    pub current: i32,
    pub connected: bool,
    /// Sub-tick position carried between steps
    residual: f64,
}

impl SimMotorState {
    fn new(port: PortSpec, cartridge: GearCartridge) -> Self {
        Self {
            port,
            reversed: port.reversed,
            cartridge,
            voltage_command: None,
            velocity_command: None,
            braking: false,
            brake_mode: BrakeMode::default(),
            encoder_units: EncoderUnits::default(),
            position: 0,
            velocity: 0.0,
            voltage: 0,
            current: 0,
            connected: true,
            residual: 0.0,
        }
    }

    /// Advance by `dt` seconds: velocity follows the command instantly
    fn step(&mut self, dt: f64) {
        let free_speed = self.cartridge.native_ticks() as f64 * FREE_SPEED_REV_PER_SEC;
        let (velocity, voltage) = if self.braking {
            (0.0, 0)
        } else if let Some(mv) = self.voltage_command {
            let mv = mv.clamp(-MAX_VOLTAGE_MV, MAX_VOLTAGE_MV);
            (free_speed * mv as f64 / MAX_VOLTAGE_MV as f64, mv)
        } else if let Some(tps) = self.velocity_command {
            let tps = (tps as f64).clamp(-free_speed, free_speed);
            (tps, (tps / free_speed * MAX_VOLTAGE_MV as f64) as i32)
        } else {
            (0.0, 0)
        };

        let direction = direction(self.reversed);
        self.velocity = velocity * direction as f64;
        self.voltage = voltage * direction;
        self.current = (voltage.abs() as f64 / MAX_VOLTAGE_MV as f64 * FULL_VOLTAGE_CURRENT_MA) as i32;

        let travelled = self.velocity * dt + self.residual;
        let whole = travelled.trunc();
        self.residual = travelled - whole;
        self.position = self.position.saturating_add(whole as i32);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimQuadratureState {
    pub wiring: Option<QuadratureWiring>,
    /// Shaft-frame count; a reversed encoder reads it negated
    pub value: i32,
    pub connected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimRotationState {
    pub reversed: bool,
    /// centidegrees, shaft frame
    pub position: i32,
    /// centidegrees per second
    pub velocity: i32,
    pub connected: bool,
}

#[derive(Debug, Clone)]
pub struct SimImuState {
    pub heading: f64,
    /// Polls of `is_calibrating` that still report true
    pub calibration_polls: u32,
    pub calibration_started: bool,
    pub connected: bool,
}

impl Default for SimImuState {
    fn default() -> Self {
        Self {
            heading: 0.0,
            calibration_polls: 3,
            calibration_started: false,
            connected: true,
        }
    }
}

/// Owns every simulated device and hands out handles to them
#[derive(Debug, Default)]
pub struct SimWorld {
    motors: HashMap<u8, Shared<SimMotorState>>,
    quadrature: HashMap<(Option<u8>, u8), Shared<SimQuadratureState>>,
    rotation: HashMap<u8, Shared<SimRotationState>>,
    imus: HashMap<u8, Shared<SimImuState>>,
    /// Calibration length applied to IMUs created from now on
    imu_calibration_polls: Option<u32>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// IMUs created after this call need `polls` status checks to finish calibrating
    pub fn set_imu_calibration_polls(&mut self, polls: u32) {
        self.imu_calibration_polls = Some(polls);
    }

    pub fn motor_state(&self, port: u8) -> Option<Shared<SimMotorState>> {
        self.motors.get(&port).cloned()
    }

    /// Encoder whose top wire is on `top`, on any expander
    pub fn quadrature_state(&self, top: u8) -> Option<Shared<SimQuadratureState>> {
        self.quadrature
            .iter()
            .find(|((_, t), _)| *t == top)
            .map(|(_, state)| state.clone())
    }

    pub fn rotation_state(&self, port: u8) -> Option<Shared<SimRotationState>> {
        self.rotation.get(&port).cloned()
    }

    pub fn imu_state(&self, port: u8) -> Option<Shared<SimImuState>> {
        self.imus.get(&port).cloned()
    }

    fn claim_smart_port(&self, port: u8) -> Result<()> {
        if self.motors.contains_key(&port) || self.rotation.contains_key(&port) || self.imus.contains_key(&port) {
            return Err(HardwareError::PortInUse { port });
        }
        Ok(())
    }

    /// Advance every motor by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        for motor in self.motors.values() {
            motor.borrow_mut().step(dt);
        }
    }
}

impl DeviceFactory for SimWorld {
    fn motor(&mut self, port: PortSpec, cartridge: GearCartridge) -> Result<Box<dyn Motor>> {
        self.claim_smart_port(port.index)?;
        debug!("Simulated motor on port {:?}", port);
        let state = Rc::new(RefCell::new(SimMotorState::new(port, cartridge)));
        self.motors.insert(port.index, state.clone());
        Ok(Box::new(SimMotor { state }))
    }

    fn quadrature_encoder(&mut self, wiring: QuadratureWiring) -> Result<Box<dyn QuadratureEncoder>> {
        let key = (wiring.expander, wiring.top);
        if self.quadrature.contains_key(&key) {
            return Err(HardwareError::PortInUse { port: wiring.top });
        }
        let state = Rc::new(RefCell::new(SimQuadratureState {
            wiring: Some(wiring),
            value: 0,
            connected: true,
        }));
        self.quadrature.insert(key, state.clone());
        Ok(Box::new(SimQuadrature { state }))
    }

    fn rotation_sensor(&mut self, port: PortSpec) -> Result<Box<dyn RotationSensor>> {
        self.claim_smart_port(port.index)?;
        let state = Rc::new(RefCell::new(SimRotationState {
            reversed: port.reversed,
            connected: true,
            ..Default::default()
        }));
        self.rotation.insert(port.index, state.clone());
        Ok(Box::new(SimRotation {
            port: port.index,
            state,
        }))
    }

    fn inertial_sensor(&mut self, port: u8) -> Result<Box<dyn InertialSensor>> {
        self.claim_smart_port(port)?;
        let mut imu = SimImuState::default();
        if let Some(polls) = self.imu_calibration_polls {
            imu.calibration_polls = polls;
        }
        let state = Rc::new(RefCell::new(imu));
        self.imus.insert(port, state.clone());
        Ok(Box::new(SimImu { port, state }))
    }
}

pub struct SimMotor {
    state: Shared<SimMotorState>,
}

impl SimMotor {
    fn with_state<T>(&mut self, f: impl FnOnce(&mut SimMotorState) -> T) -> Result<T> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: state.port.index });
        }
        Ok(f(&mut state))
    }
}

impl Motor for SimMotor {
    fn port(&self) -> PortSpec {
        self.state.borrow().port
    }

    fn move_voltage(&mut self, millivolts: i32) -> Result<()> {
        self.with_state(|s| {
            s.voltage_command = Some(millivolts);
            s.velocity_command = None;
            s.braking = false;
        })
    }

    fn move_velocity(&mut self, ticks_per_second: i32) -> Result<()> {
        self.with_state(|s| {
            s.velocity_command = Some(ticks_per_second);
            s.voltage_command = None;
            s.braking = false;
        })
    }

    fn brake(&mut self) -> Result<()> {
        self.with_state(|s| {
            s.voltage_command = None;
            s.velocity_command = None;
            s.braking = true;
        })
    }

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<()> {
        self.with_state(|s| s.brake_mode = mode)
    }

    fn set_encoder_units(&mut self, units: EncoderUnits) -> Result<()> {
        self.with_state(|s| s.encoder_units = units)
    }

    fn position(&mut self) -> Result<i32> {
        self.with_state(|s| s.position * direction(s.reversed))
    }

    fn velocity(&mut self) -> Result<f64> {
        self.with_state(|s| s.velocity * direction(s.reversed) as f64)
    }

    fn tare_position(&mut self) -> Result<()> {
        self.with_state(|s| {
            s.position = 0;
            s.residual = 0.0;
        })
    }

    fn voltage(&mut self) -> Result<i32> {
        self.with_state(|s| s.voltage * direction(s.reversed))
    }

    fn current(&mut self) -> Result<i32> {
        self.with_state(|s| s.current)
    }
}

pub struct SimQuadrature {
    state: Shared<SimQuadratureState>,
}

impl SimQuadrature {
    fn port(&self) -> u8 {
        self.state.borrow().wiring.map_or(0, |w| w.top)
    }
}

impl QuadratureEncoder for SimQuadrature {
    fn value(&mut self) -> Result<i32> {
        let state = self.state.borrow();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port() });
        }
        let reversed = state.wiring.is_some_and(|w| w.reversed);
        Ok(state.value * direction(reversed))
    }

    fn reset(&mut self) -> Result<()> {
        if !self.state.borrow().connected {
            return Err(HardwareError::Disconnected { port: self.port() });
        }
        self.state.borrow_mut().value = 0;
        Ok(())
    }
}

pub struct SimRotation {
    port: u8,
    state: Shared<SimRotationState>,
}

impl RotationSensor for SimRotation {
    fn position(&mut self) -> Result<i32> {
        let state = self.state.borrow();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        Ok(state.position * direction(state.reversed))
    }

    fn velocity(&mut self) -> Result<i32> {
        let state = self.state.borrow();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        Ok(state.velocity * direction(state.reversed))
    }

    fn reset_position(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        state.position = 0;
        Ok(())
    }
}

pub struct SimImu {
    port: u8,
    state: Shared<SimImuState>,
}

impl InertialSensor for SimImu {
    fn start_calibration(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        state.calibration_started = true;
        Ok(())
    }

    fn is_calibrating(&mut self) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        if !state.calibration_started || state.calibration_polls == 0 {
            return Ok(false);
        }
        state.calibration_polls -= 1;
        Ok(true)
    }

    fn heading(&mut self) -> Result<f64> {
        let state = self.state.borrow();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        Ok(state.heading.rem_euclid(360.0))
    }

    fn reset_heading(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(HardwareError::Disconnected { port: self.port });
        }
        state.heading = 0.0;
        Ok(())
    }
}

/// Controller whose stick positions are set from outside
#[derive(Debug, Clone, Default)]
pub struct SimController {
    axes: Shared<[i32; 4]>,
}

impl SimController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, axis: Axis, value: i32) {
        self.axes.borrow_mut()[axis.index()] = value;
    }

    pub fn center(&self) {
        *self.axes.borrow_mut() = [0; 4];
    }
}

impl ControllerInput for SimController {
    fn analog(&mut self, axis: Axis) -> Result<i32> {
        Ok(self.axes.borrow()[axis.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_collision() {
        let mut world = SimWorld::new();
        world.motor(PortSpec::decode(1), GearCartridge::Mid).unwrap();
        let err = world.rotation_sensor(PortSpec::decode(-1)).err().unwrap();
        assert_eq!(err, HardwareError::PortInUse { port: 1 });
    }

    #[test]
    fn test_motor_integrates_position() {
        let mut world = SimWorld::new();
        let mut motor = world.motor(PortSpec::decode(3), GearCartridge::Mid).unwrap();
        motor.move_voltage(MAX_VOLTAGE_MV).unwrap();
        for _ in 0..50 {
            world.step(0.02);
        }
        // One second at full voltage
        let expected = 600.0 * FREE_SPEED_REV_PER_SEC;
        let position = motor.position().unwrap() as f64;
        println!("position after 1s = {position}");
        assert!((position - expected).abs() <= 1.0);

        motor.brake().unwrap();
        world.step(0.02);
        assert_eq!(motor.velocity().unwrap(), 0.0);
    }

    #[test]
    fn test_reversed_motor_spins_shaft_backwards() {
        let mut world = SimWorld::new();
        let mut motor = world.motor(PortSpec::decode(-4), GearCartridge::Mid).unwrap();
        motor.move_voltage(MAX_VOLTAGE_MV / 2).unwrap();
        world.step(0.1);

        let shaft = world.motor_state(4).unwrap().borrow().clone();
        println!("shaft position = {}, velocity = {}", shaft.position, shaft.velocity);
        assert!(shaft.position < 0, "reversed shaft should turn backwards");
        assert!(shaft.voltage < 0);
        assert_eq!(motor.position().unwrap(), -shaft.position, "reading is in the command frame");
        assert!(motor.velocity().unwrap() > 0.0);
        assert_eq!(motor.voltage().unwrap(), MAX_VOLTAGE_MV / 2);
    }

    #[test]
    fn test_reversed_sensors_negate_readings() {
        let mut world = SimWorld::new();
        let mut rotation = world.rotation_sensor(PortSpec::decode(-7)).unwrap();
        world.rotation_state(7).unwrap().borrow_mut().position = 9_000;
        world.rotation_state(7).unwrap().borrow_mut().velocity = 100;
        assert_eq!(rotation.position().unwrap(), -9_000);
        assert_eq!(rotation.velocity().unwrap(), -100);

        let wiring = QuadratureWiring {
            top: 1,
            bottom: 2,
            expander: None,
            reversed: true,
        };
        let mut encoder = world.quadrature_encoder(wiring).unwrap();
        world.quadrature_state(1).unwrap().borrow_mut().value = 40;
        assert_eq!(encoder.value().unwrap(), -40);
    }

    #[test]
    fn test_imu_calibration_polls() {
        let mut world = SimWorld::new();
        world.set_imu_calibration_polls(2);
        let mut imu = world.inertial_sensor(10).unwrap();
        assert!(!imu.is_calibrating().unwrap());
        imu.start_calibration().unwrap();
        assert!(imu.is_calibrating().unwrap());
        assert!(imu.is_calibrating().unwrap());
        assert!(!imu.is_calibrating().unwrap());
    }

    #[test]
    fn test_controller_shares_state() {
        let controller = SimController::new();
        let mut handle = controller.clone();
        controller.set(Axis::RightY, -90);
        assert_eq!(handle.analog(Axis::RightY).unwrap(), -90);
        controller.center();
        assert_eq!(handle.analog(Axis::RightY).unwrap(), 0);
    }
}
