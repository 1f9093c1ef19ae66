// Joystick-to-motor control laws
// Pure functions of the latest stick sample and the chassis settings. Nothing
// is carried between ticks.

use serde::{Deserialize, Serialize};

use super::topology::{Corner, DrivetrainTopology};
use crate::config::{DEFAULT_DEADBAND, JOYSTICK_MAX};
use crate::error::{ChassisError, Result};
use crate::hardware::Axis;
use crate::messages::{CornerCommand, MotorCommand, SideCommands};

/// Linear map from the controller's symmetric range onto a motor output range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisScale {
    /// Full-scale stick reading (127 on a V5-style controller)
    pub max_magnitude: i32,
    /// Output at full stick: millivolts or ticks/s
    pub full_scale: i32,
}

impl AxisScale {
    pub fn new(max_magnitude: i32, full_scale: i32) -> Self {
        Self {
            max_magnitude: max_magnitude.max(1),
            full_scale,
        }
    }

    /// Stick range onto a millivolt range
    pub fn voltage(full_scale_mv: i32) -> Self {
        Self::new(JOYSTICK_MAX, full_scale_mv)
    }

    /// Clamp to the stick range, then rescale. Saturates instead of overflowing.
    pub fn scale(&self, axis: i32) -> i32 {
        let clamped = axis.clamp(-self.max_magnitude, self.max_magnitude) as i64;
        (clamped * self.full_scale as i64 / self.max_magnitude as i64) as i32
    }
}

/// How the deadband gates commands when a law reads more than one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadbandPolicy {
    /// Each axis is gated on its own
    Independent,
    /// Any axis outside the deadband releases every axis, unfiltered
    Joint,
}

/// Whether arcade forward and turn come from two sticks or one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickLayout {
    #[default]
    Split,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcadeSticks {
    pub layout: StickLayout,
    /// Swap which stick supplies forward and which supplies turn
    pub flipped: bool,
}

impl ArcadeSticks {
    /// (forward, turn) axes
    pub fn axes(&self) -> (Axis, Axis) {
        match (self.layout, self.flipped) {
            (StickLayout::Split, false) => (Axis::LeftY, Axis::RightX),
            (StickLayout::Single, false) => (Axis::RightY, Axis::RightX),
            (StickLayout::Split, true) => (Axis::RightY, Axis::LeftX),
            (StickLayout::Single, true) => (Axis::LeftY, Axis::LeftX),
        }
    }
}

/// Which controller axis feeds each logical input, plus deadband handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerMapping {
    pub tank_left: Axis,
    pub tank_right: Axis,
    pub arcade: ArcadeSticks,
    pub strafe: Axis,
    pub rotate: Axis,
    pub deadband: i32,
    pub tank_policy: DeadbandPolicy,
    pub arcade_policy: DeadbandPolicy,
    pub holonomic_policy: DeadbandPolicy,
}

impl Default for ControllerMapping {
    fn default() -> Self {
        Self {
            tank_left: Axis::LeftY,
            tank_right: Axis::RightY,
            arcade: ArcadeSticks::default(),
            strafe: Axis::LeftX,
            rotate: Axis::RightX,
            deadband: DEFAULT_DEADBAND,
            tank_policy: DeadbandPolicy::Independent,
            arcade_policy: DeadbandPolicy::Joint,
            holonomic_policy: DeadbandPolicy::Joint,
        }
    }
}

fn outside(axis: i32, deadband: i32) -> bool {
    axis.saturating_abs() > deadband
}

/// Apply the policy to a set of axis samples.
/// Returns `None` when everything is inside the deadband (stop), otherwise the
/// samples to feed the mixer.
fn gate<const N: usize>(samples: [i32; N], deadband: i32, policy: DeadbandPolicy) -> Option<[i32; N]> {
    if !samples.iter().any(|&s| outside(s, deadband)) {
        return None;
    }
    match policy {
        DeadbandPolicy::Joint => Some(samples),
        DeadbandPolicy::Independent => Some(samples.map(|s| if outside(s, deadband) { s } else { 0 })),
    }
}

/// Left stick drives the left side, right stick the right side
pub fn tank(left: i32, right: i32, deadband: i32, policy: DeadbandPolicy, scale: AxisScale) -> SideCommands {
    match policy {
        DeadbandPolicy::Independent => SideCommands {
            left: gated_side(left, deadband, scale),
            right: gated_side(right, deadband, scale),
        },
        DeadbandPolicy::Joint => match gate([left, right], deadband, policy) {
            Some([l, r]) => SideCommands {
                left: MotorCommand::Output(scale.scale(l)),
                right: MotorCommand::Output(scale.scale(r)),
            },
            None => SideCommands::stop(),
        },
    }
}

fn gated_side(axis: i32, deadband: i32, scale: AxisScale) -> MotorCommand {
    if outside(axis, deadband) {
        MotorCommand::Output(scale.scale(axis))
    } else {
        MotorCommand::Stop
    }
}

/// left = scale(forward) + scale(turn), right = scale(forward) - scale(turn)
pub fn arcade(forward: i32, turn: i32, deadband: i32, policy: DeadbandPolicy, scale: AxisScale) -> SideCommands {
    let Some([f, t]) = gate([forward, turn], deadband, policy) else {
        return SideCommands::stop();
    };
    let (f, t) = (scale.scale(f) as i64, scale.scale(t) as i64);
    SideCommands {
        left: MotorCommand::Output(saturate(f + t)),
        right: MotorCommand::Output(saturate(f - t)),
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Per-corner sign pattern: [forward, strafe, rotate]
fn corner_weights(corner: Corner) -> [i64; 3] {
    match corner {
        Corner::FrontLeft => [1, 1, 1],
        Corner::FrontRight => [1, -1, -1],
        Corner::BackLeft => [1, -1, 1],
        Corner::BackRight => [1, 1, -1],
        Corner::Left => [1, 0, 1],
        Corner::Right => [1, 0, -1],
        Corner::Center => [0, 1, 0],
    }
}

/// Forward/strafe/rotate mixing for holonomic topologies.
///
/// Outputs are scaled down together when any corner exceeds full scale, so the
/// direction of travel is kept.
pub fn holonomic(
    topology: DrivetrainTopology,
    forward: i32,
    strafe: i32,
    rotate: i32,
    deadband: i32,
    policy: DeadbandPolicy,
    scale: AxisScale,
) -> Result<Vec<CornerCommand>> {
    if !topology.is_holonomic() {
        return Err(ChassisError::Unsupported {
            operation: "holonomic control",
            reason: format!("{topology:?} drivetrains cannot strafe"),
        });
    }

    let corners = topology.corners();
    let Some(samples) = gate([forward, strafe, rotate], deadband, policy) else {
        return Ok(corners
            .iter()
            .map(|&corner| CornerCommand {
                corner,
                command: MotorCommand::Stop,
            })
            .collect());
    };

    let scaled = samples.map(|s| scale.scale(s) as i64);
    let mut outputs: Vec<i64> = corners
        .iter()
        .map(|&corner| {
            corner_weights(corner)
                .iter()
                .zip(scaled)
                .map(|(weight, value)| weight * value)
                .sum()
        })
        .collect();

    // Normalise if any corner exceeds the limit
    let limit = (scale.full_scale as i64).abs();
    let peak = outputs.iter().map(|o| o.abs()).max().unwrap_or(0);
    if peak > limit {
        for output in &mut outputs {
            *output = *output * limit / peak;
        }
    }

    Ok(corners
        .iter()
        .zip(outputs)
        .map(|(&corner, output)| CornerCommand {
            corner,
            command: MotorCommand::Output(output as i32),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: AxisScale = AxisScale {
        max_magnitude: 127,
        full_scale: 12_000,
    };

    fn command_for(commands: &[CornerCommand], corner: Corner) -> MotorCommand {
        commands.iter().find(|c| c.corner == corner).unwrap().command
    }

    #[test]
    fn test_scale_endpoints() {
        assert_eq!(FULL.scale(0), 0);
        assert_eq!(FULL.scale(127), 12_000);
        assert_eq!(FULL.scale(-127), -12_000);
        assert_eq!(FULL.scale(60), 60 * 12_000 / 127);
    }

    #[test]
    fn test_scale_saturates() {
        assert_eq!(FULL.scale(500), FULL.scale(127));
        assert_eq!(FULL.scale(-500), FULL.scale(-127));
        assert_eq!(FULL.scale(i32::MAX), FULL.scale(127));
        assert_eq!(FULL.scale(i32::MIN), FULL.scale(-127));
    }

    #[test]
    fn test_deadband_boundary() {
        let on_edge = tank(5, 5, 5, DeadbandPolicy::Independent, FULL);
        assert_eq!(on_edge, SideCommands::stop());

        let just_past = tank(6, -6, 5, DeadbandPolicy::Independent, FULL);
        assert_eq!(just_past.left, MotorCommand::Output(FULL.scale(6)));
        assert_eq!(just_past.right, MotorCommand::Output(FULL.scale(-6)));
        assert_ne!(just_past.left.output(), 0);
    }

    #[test]
    fn test_tank_independent_stops_idle_side() {
        let commands = tank(10, 0, 5, DeadbandPolicy::Independent, FULL);
        assert_eq!(commands.left, MotorCommand::Output(FULL.scale(10)));
        assert_eq!(commands.right, MotorCommand::Stop);
    }

    #[test]
    fn test_tank_joint_drives_both_sides() {
        // The right stick is inside the deadband but still passes through
        let commands = tank(10, 3, 5, DeadbandPolicy::Joint, FULL);
        assert_eq!(commands.left, MotorCommand::Output(FULL.scale(10)));
        assert_eq!(commands.right, MotorCommand::Output(FULL.scale(3)));

        let idle = tank(4, -4, 5, DeadbandPolicy::Joint, FULL);
        assert_eq!(idle, SideCommands::stop());
    }

    #[test]
    fn test_arcade_forward_only() {
        let commands = arcade(60, 0, 5, DeadbandPolicy::Joint, FULL);
        assert_eq!(commands.left, commands.right);
        assert_eq!(commands.left, MotorCommand::Output(FULL.scale(60)));
    }

    #[test]
    fn test_arcade_turn_cancels_on_sum() {
        for f in (-127..=127).step_by(7) {
            for t in (-127..=127).step_by(11) {
                let commands = arcade(f, t, 0, DeadbandPolicy::Joint, FULL);
                if commands.left.is_stop() {
                    assert_eq!((f, t), (0, 0));
                    continue;
                }
                assert_eq!(commands.left.output() + commands.right.output(), 2 * FULL.scale(f));
            }
        }
    }

    #[test]
    fn test_arcade_mix_saturates_at_huge_full_scale() {
        let huge = AxisScale::new(JOYSTICK_MAX, i32::MAX);
        let commands = arcade(127, 127, 5, DeadbandPolicy::Joint, huge);
        assert_eq!(commands.left, MotorCommand::Output(i32::MAX), "sum should saturate, not wrap");
        assert_eq!(commands.right, MotorCommand::Output(0));

        let commands = arcade(-127, -127, 5, DeadbandPolicy::Joint, huge);
        assert_eq!(commands.left, MotorCommand::Output(i32::MIN));
        let commands = arcade(-127, 127, 5, DeadbandPolicy::Joint, huge);
        assert_eq!(commands.right, MotorCommand::Output(i32::MIN));
        assert_eq!(commands.left, MotorCommand::Output(0));
    }

    #[test]
    fn test_arcade_independent_drops_small_axis() {
        // Turn of 3 is inside the deadband: gated to zero under Independent
        let independent = arcade(60, 3, 5, DeadbandPolicy::Independent, FULL);
        assert_eq!(independent.left, independent.right);

        let joint = arcade(60, 3, 5, DeadbandPolicy::Joint, FULL);
        assert!(joint.left.output() > joint.right.output());

        assert_eq!(arcade(2, -3, 5, DeadbandPolicy::Independent, FULL), SideCommands::stop());
    }

    #[test]
    fn test_arcade_axis_table() {
        let axes = |layout, flipped| ArcadeSticks { layout, flipped }.axes();
        assert_eq!(axes(StickLayout::Split, false), (Axis::LeftY, Axis::RightX));
        assert_eq!(axes(StickLayout::Single, false), (Axis::RightY, Axis::RightX));
        assert_eq!(axes(StickLayout::Split, true), (Axis::RightY, Axis::LeftX));
        assert_eq!(axes(StickLayout::Single, true), (Axis::LeftY, Axis::LeftX));
    }

    #[test]
    fn test_mecanum_pure_strafe() {
        let commands = holonomic(DrivetrainTopology::Mecanum, 0, 50, 0, 5, DeadbandPolicy::Joint, FULL).unwrap();
        let s = FULL.scale(50);
        assert_eq!(command_for(&commands, Corner::FrontLeft), MotorCommand::Output(s));
        assert_eq!(command_for(&commands, Corner::FrontRight), MotorCommand::Output(-s));
        assert_eq!(command_for(&commands, Corner::BackLeft), MotorCommand::Output(-s));
        assert_eq!(command_for(&commands, Corner::BackRight), MotorCommand::Output(s));
    }

    #[test]
    fn test_x_drive_rotation_spins_sides_opposite() {
        let commands = holonomic(DrivetrainTopology::XDrive, 0, 0, 40, 5, DeadbandPolicy::Joint, FULL).unwrap();
        for command in &commands {
            let output = command.command.output();
            match command.corner.side() {
                crate::drive::Side::Left => assert!(output > 0),
                _ => assert!(output < 0),
            }
        }
    }

    #[test]
    fn test_holonomic_normalises_to_full_scale() {
        let commands = holonomic(DrivetrainTopology::XDrive, 127, 127, 127, 5, DeadbandPolicy::Joint, FULL).unwrap();
        let peak = commands.iter().map(|c| c.command.output().abs()).max().unwrap();
        println!("peak after normalisation = {peak}");
        assert_eq!(peak, 12_000);
        for command in &commands {
            assert!(command.command.output().abs() <= 12_000);
        }
    }

    #[test]
    fn test_h_drive_center_follows_strafe() {
        let commands = holonomic(DrivetrainTopology::HDrive, 40, 30, 0, 5, DeadbandPolicy::Joint, FULL).unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(command_for(&commands, Corner::Center), MotorCommand::Output(FULL.scale(30)));
        assert_eq!(command_for(&commands, Corner::Left), MotorCommand::Output(FULL.scale(40)));
        assert_eq!(command_for(&commands, Corner::Right), MotorCommand::Output(FULL.scale(40)));
    }

    #[test]
    fn test_asterisk_covers_six_groups() {
        let commands = holonomic(DrivetrainTopology::Asterisk, 30, 0, 0, 5, DeadbandPolicy::Joint, FULL).unwrap();
        assert_eq!(commands.len(), 6);
        assert!(commands.iter().all(|c| c.command == MotorCommand::Output(FULL.scale(30))));
    }

    #[test]
    fn test_holonomic_idle_stops_everything() {
        let commands = holonomic(DrivetrainTopology::Mecanum, 2, -3, 4, 5, DeadbandPolicy::Independent, FULL).unwrap();
        assert!(commands.iter().all(|c| c.command.is_stop()));
    }

    #[test]
    fn test_holonomic_rejected_on_tank() {
        let err = holonomic(DrivetrainTopology::Tank, 50, 50, 0, 5, DeadbandPolicy::Joint, FULL).unwrap_err();
        assert!(matches!(err, ChassisError::Unsupported { .. }));
    }
}
