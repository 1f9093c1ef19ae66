// 50 Hz control loop over the simulated drivetrain
// Each tick: advance the simulation, sample the controller, run the selected
// control law. A hardware fault stops the motors and flags the runtime as
// faulted until a tick succeeds again.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{ChassisConfig, JOYSTICK_MAX, LOOP_HZ, TELEMETRY_EVERY_TICKS};
use crate::drive::Chassis;
use crate::error::{ChassisError, Result};
use crate::hardware::keyboard::{KeyboardController, RawModeGuard};
use crate::hardware::sim::{SimController, SimWorld};
use crate::hardware::{Axis, ControllerInput};
use crate::messages::{ChassisTelemetry, DriveMode, RuntimeHealth};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Chassis description; the built-in tank drive when absent
    pub config: Option<PathBuf>,
    pub mode: DriveMode,
    pub keyboard: bool,
    /// Stop after this many ticks
    pub ticks: Option<u64>,
}

pub struct Runtime {
    chassis: Chassis,
    mode: DriveMode,
    health: RuntimeHealth,
    tick_count: u64,
}

impl Runtime {
    pub fn new(chassis: Chassis, mode: DriveMode) -> Result<Self> {
        if mode == DriveMode::Holonomic && !chassis.topology().is_holonomic() {
            return Err(ChassisError::Unsupported {
                operation: "holonomic mode",
                reason: format!("{:?} drivetrains cannot strafe", chassis.topology()),
            });
        }
        Ok(Self {
            chassis,
            mode,
            health: RuntimeHealth::Ok,
            tick_count: 0,
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn chassis_mut(&mut self) -> &mut Chassis {
        &mut self.chassis
    }

    /// Run one control tick
    pub fn step(&mut self) -> RuntimeHealth {
        self.tick_count += 1;
        match self.chassis.drive(self.mode) {
            Ok(()) => {
                if self.health == RuntimeHealth::Fault {
                    info!("Drive recovered after fault");
                }
                self.health = RuntimeHealth::Ok;
            }
            Err(e) => {
                // Only log the transition, not every faulted tick
                if self.health != RuntimeHealth::Fault {
                    error!("Drive fault, stopping motors: {}", e);
                }
                if let Err(stop_err) = self.chassis.stop() {
                    warn!("Stop after fault also failed: {}", stop_err);
                }
                self.health = RuntimeHealth::Fault;
            }
        }
        self.health
    }

    pub fn telemetry(&mut self) -> Result<ChassisTelemetry> {
        self.chassis.telemetry()
    }
}

/// Stick positions for the demo drive when no keyboard is attached.
/// Two-second phases: forward, turn, strafe, idle.
pub fn scripted_sticks(tick: u64) -> [(Axis, i32); 4] {
    let half = JOYSTICK_MAX / 2;
    let phase = (tick / (2 * LOOP_HZ)) % 4;
    let (left_x, left_y, right_x, right_y) = match phase {
        0 => (0, half, 0, half),
        1 => (0, half, half, -half),
        2 => (half, 0, 0, 0),
        _ => (0, 0, 0, 0),
    };
    [
        (Axis::LeftX, left_x),
        (Axis::LeftY, left_y),
        (Axis::RightX, right_x),
        (Axis::RightY, right_y),
    ]
}

pub async fn run(options: RunOptions) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &options.config {
        Some(path) => {
            info!("Loading chassis config from {}", path.display());
            ChassisConfig::from_json_file(path)?
        }
        None => {
            info!("No config given, using the built-in tank drive");
            ChassisConfig::default_tank()
        }
    };

    let mut world = SimWorld::new();
    let scripted = SimController::new();
    let keyboard = KeyboardController::new();
    let input: Box<dyn ControllerInput> = if options.keyboard {
        Box::new(keyboard.clone())
    } else {
        Box::new(scripted.clone())
    };

    // Blocks this thread for IMU calibration (up to the configured timeout).
    // Nothing else is scheduled on the runtime yet.
    let chassis = Chassis::new(&config, &mut world, input)?;
    let mut runtime = Runtime::new(chassis, options.mode)?;

    let _raw_mode = if options.keyboard {
        info!("Controls: WASD=left stick, IJKL=right stick, R/F=speed, Q=quit");
        info!("Speed: LOW");
        Some(RawModeGuard::enable()?)
    } else {
        None
    };

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let dt = period.as_secs_f64();
    let mut tick = interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Runtime started: {}Hz loop, {:?} mode", LOOP_HZ, options.mode);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }

        // 1. Operator input
        if options.keyboard {
            keyboard.pump()?;
            if keyboard.quit_requested() {
                info!("Quit requested");
                break;
            }
        } else {
            for (axis, value) in scripted_sticks(runtime.tick_count()) {
                scripted.set(axis, value);
            }
        }

        // 2. Physics, then control
        world.step(dt);
        runtime.step();

        // 3. Telemetry once a second
        if runtime.tick_count() % TELEMETRY_EVERY_TICKS == 0 {
            match runtime.telemetry() {
                Ok(telemetry) => {
                    let report = json!({
                        "tick": runtime.tick_count(),
                        "health": runtime.health(),
                        "chassis": telemetry,
                    });
                    info!("{}", report);
                }
                Err(e) => warn!("Telemetry read failed: {}", e),
            }
        }

        if options.ticks.is_some_and(|limit| runtime.tick_count() >= limit) {
            info!("Ran {} ticks, stopping", runtime.tick_count());
            break;
        }
    }

    runtime.chassis_mut().stop()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(world: &mut SimWorld, controller: &SimController, mode: DriveMode) -> Runtime {
        let chassis = Chassis::new(&ChassisConfig::default_tank(), world, Box::new(controller.clone())).unwrap();
        Runtime::new(chassis, mode).unwrap()
    }

    #[test]
    fn test_holonomic_mode_needs_holonomic_chassis() {
        let mut world = SimWorld::new();
        let chassis = Chassis::new(&ChassisConfig::default_tank(), &mut world, Box::new(SimController::new())).unwrap();
        assert!(Runtime::new(chassis, DriveMode::Holonomic).is_err());
    }

    #[test]
    fn test_fault_stops_and_recovers() {
        let mut world = SimWorld::new();
        let controller = SimController::new();
        let mut runtime = runtime(&mut world, &controller, DriveMode::Arcade);
        controller.set(Axis::LeftY, 100);

        assert_eq!(runtime.step(), RuntimeHealth::Ok);
        world.motor_state(2).unwrap().borrow_mut().connected = false;
        assert_eq!(runtime.step(), RuntimeHealth::Fault);
        assert!(world.motor_state(1).unwrap().borrow().braking, "healthy motors stop on fault");

        world.motor_state(2).unwrap().borrow_mut().connected = true;
        assert_eq!(runtime.step(), RuntimeHealth::Ok);
        assert_eq!(runtime.tick_count(), 3);
    }

    #[test]
    fn test_scripted_profile_phases() {
        let forward = scripted_sticks(0);
        assert!(forward.contains(&(Axis::LeftY, JOYSTICK_MAX / 2)));
        let idle = scripted_sticks(3 * 2 * LOOP_HZ);
        assert!(idle.iter().all(|&(_, v)| v == 0));
        // Repeats every 8 s
        assert_eq!(scripted_sticks(1), scripted_sticks(1 + 8 * LOOP_HZ));
    }

    #[test]
    fn test_scripted_drive_moves_the_robot() {
        let mut world = SimWorld::new();
        let controller = SimController::new();
        let mut runtime = runtime(&mut world, &controller, DriveMode::Tank);
        for _ in 0..LOOP_HZ {
            for (axis, value) in scripted_sticks(runtime.tick_count()) {
                controller.set(axis, value);
            }
            runtime.step();
            world.step(1.0 / LOOP_HZ as f64);
        }
        let telemetry = runtime.telemetry().unwrap();
        println!("{}", serde_json::to_string(&telemetry).unwrap());
        assert!(telemetry.left.ticks > 0);
        assert!(telemetry.right.ticks > 0);
        assert!(telemetry.left.inches > 0.0);
    }

    #[tokio::test]
    async fn test_run_fixed_ticks() {
        let options = RunOptions {
            ticks: Some(3),
            ..Default::default()
        };
        assert!(run(options).await.is_ok());
    }
}
