// Ganged drive motors
//
// Every motor in a group gets the same command. The first motor is the
// sensored one: its encoder backs motor-encoder odometry for the group.

use std::fmt;

use tracing::{debug, info};

use super::geometry::GearCartridge;
use super::port::PortSpec;
use super::topology::Corner;
use crate::error::{ChassisError, Result};
use crate::hardware::{self, BrakeMode, DeviceFactory, EncoderUnits, Motor};
use crate::messages::{CommandMode, MotorCommand};

pub struct MotorGroup {
    corner: Corner,
    motors: Vec<Box<dyn Motor>>,
}

impl fmt::Debug for MotorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorGroup")
            .field("corner", &self.corner)
            .field("ports", &self.ports())
            .finish()
    }
}

impl MotorGroup {
    /// Build a group from its ports. The first port is the sensored motor.
    pub fn new(corner: Corner, ports: &[PortSpec], cartridge: GearCartridge, devices: &mut dyn DeviceFactory) -> Result<Self> {
        if ports.is_empty() {
            return Err(ChassisError::Configuration(format!("motor group '{corner}' has no motors")));
        }

        info!("Opening {} motor group on ports {:?}", corner, ports);
        let motors = ports
            .iter()
            .map(|&port| devices.motor(port, cartridge))
            .collect::<hardware::Result<Vec<_>>>()?;

        Ok(Self { corner, motors })
    }

    pub fn corner(&self) -> Corner {
        self.corner
    }

    pub fn ports(&self) -> Vec<PortSpec> {
        self.motors.iter().map(|m| m.port()).collect()
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    /// Run `op` on every motor. A failing motor doesn't stop the rest from
    /// being commanded; the first failure is returned.
    fn for_each(&mut self, mut op: impl FnMut(&mut dyn Motor) -> hardware::Result<()>) -> hardware::Result<()> {
        let mut first_error = None;
        for motor in &mut self.motors {
            if let Err(e) = op(motor.as_mut()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn apply(&mut self, command: MotorCommand, mode: CommandMode) -> hardware::Result<()> {
        debug!("Setting {} group: {:?} ({:?})", self.corner, command, mode);
        match (command, mode) {
            (MotorCommand::Stop, _) => self.stop(),
            (MotorCommand::Output(mv), CommandMode::Voltage) => self.move_voltage(mv),
            (MotorCommand::Output(tps), CommandMode::Velocity) => self.move_velocity(tps),
        }
    }

    pub fn move_voltage(&mut self, millivolts: i32) -> hardware::Result<()> {
        self.for_each(|m| m.move_voltage(millivolts))
    }

    pub fn move_velocity(&mut self, ticks_per_second: i32) -> hardware::Result<()> {
        self.for_each(|m| m.move_velocity(ticks_per_second))
    }

    /// Stop all motors, honoring their brake mode
    pub fn stop(&mut self) -> hardware::Result<()> {
        self.for_each(|m| m.brake())
    }

    pub fn set_brake_mode(&mut self, mode: BrakeMode) -> hardware::Result<()> {
        self.for_each(|m| m.set_brake_mode(mode))
    }

    pub fn set_encoder_units(&mut self, units: EncoderUnits) -> hardware::Result<()> {
        self.for_each(|m| m.set_encoder_units(units))
    }

    fn sensored(&mut self) -> &mut dyn Motor {
        // Construction guarantees at least one motor
        self.motors[0].as_mut()
    }

    pub fn position(&mut self) -> hardware::Result<i32> {
        self.sensored().position()
    }

    pub fn velocity(&mut self) -> hardware::Result<f64> {
        self.sensored().velocity()
    }

    pub fn voltage(&mut self) -> hardware::Result<i32> {
        self.sensored().voltage()
    }

    pub fn current(&mut self) -> hardware::Result<i32> {
        self.sensored().current()
    }

    pub fn tare_position(&mut self) -> hardware::Result<()> {
        self.sensored().tare_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimWorld;
    use crate::hardware::HardwareError;

    fn group(world: &mut SimWorld, ports: &[i8]) -> MotorGroup {
        let ports: Vec<PortSpec> = ports.iter().map(|&p| PortSpec::decode(p)).collect();
        MotorGroup::new(Corner::Left, &ports, GearCartridge::Mid, world).unwrap()
    }

    #[test]
    fn test_empty_group_rejected() {
        let mut world = SimWorld::new();
        let err = MotorGroup::new(Corner::Right, &[], GearCartridge::Mid, &mut world).unwrap_err();
        assert!(matches!(err, ChassisError::Configuration(_)));
    }

    #[test]
    fn test_all_motors_commanded_identically() {
        let mut world = SimWorld::new();
        let mut motors = group(&mut world, &[1, -2, 3]);
        motors.apply(MotorCommand::Output(4000), CommandMode::Voltage).unwrap();
        for port in [1, 2, 3] {
            assert_eq!(world.motor_state(port).unwrap().borrow().voltage_command, Some(4000));
        }
        assert!(world.motor_state(2).unwrap().borrow().reversed);

        motors.apply(MotorCommand::Output(300), CommandMode::Velocity).unwrap();
        assert!(world.motor_state(3).unwrap().borrow().velocity_command == Some(300));

        motors.apply(MotorCommand::Stop, CommandMode::Voltage).unwrap();
        assert!(world.motor_state(1).unwrap().borrow().braking);
    }

    #[test]
    fn test_first_motor_is_sensored() {
        let mut world = SimWorld::new();
        let mut motors = group(&mut world, &[4, 5]);
        world.motor_state(4).unwrap().borrow_mut().position = 42;
        world.motor_state(5).unwrap().borrow_mut().position = 999;
        assert_eq!(motors.position().unwrap(), 42);
        motors.tare_position().unwrap();
        assert_eq!(motors.position().unwrap(), 0);
        assert_eq!(world.motor_state(5).unwrap().borrow().position, 999);
    }

    #[test]
    fn test_failure_does_not_skip_other_motors() {
        let mut world = SimWorld::new();
        let mut motors = group(&mut world, &[1, 2, 3]);
        world.motor_state(2).unwrap().borrow_mut().connected = false;

        let err = motors.move_voltage(6000).unwrap_err();
        assert_eq!(err, HardwareError::Disconnected { port: 2 });
        assert_eq!(world.motor_state(1).unwrap().borrow().voltage_command, Some(6000));
        assert_eq!(world.motor_state(3).unwrap().borrow().voltage_command, Some(6000));
    }
}
