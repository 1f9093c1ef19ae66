// Drivetrain topologies and where their motor groups sit

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChassisError, Result};

/// Odometry side of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
    Center,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Center => "center",
        };
        write!(f, "{name}")
    }
}

/// Which side stays put during a swing turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingSide {
    Left,
    Right,
}

/// Mounting position of a motor group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    FrontLeft,
    Left,
    BackLeft,
    FrontRight,
    Right,
    BackRight,
    Center,
}

impl Corner {
    pub fn side(self) -> Side {
        match self {
            Corner::FrontLeft | Corner::Left | Corner::BackLeft => Side::Left,
            Corner::FrontRight | Corner::Right | Corner::BackRight => Side::Right,
            Corner::Center => Side::Center,
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Corner::FrontLeft => "front_left",
            Corner::Left => "left",
            Corner::BackLeft => "back_left",
            Corner::FrontRight => "front_right",
            Corner::Right => "right",
            Corner::BackRight => "back_right",
            Corner::Center => "center",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivetrainTopology {
    /// Two sides, skid steer
    Tank,
    /// Four omni wheels at 45 degrees
    XDrive,
    Mecanum,
    /// Tank plus a sideways center wheel
    HDrive,
    /// Six groups: X corners plus two traction wheels in the middle
    Asterisk,
}

impl DrivetrainTopology {
    /// Motor groups this topology needs, in wiring order
    pub fn corners(self) -> &'static [Corner] {
        match self {
            DrivetrainTopology::Tank => &[Corner::Left, Corner::Right],
            DrivetrainTopology::XDrive | DrivetrainTopology::Mecanum => &[
                Corner::FrontLeft,
                Corner::FrontRight,
                Corner::BackLeft,
                Corner::BackRight,
            ],
            DrivetrainTopology::HDrive => &[Corner::Left, Corner::Right, Corner::Center],
            DrivetrainTopology::Asterisk => &[
                Corner::FrontLeft,
                Corner::Left,
                Corner::BackLeft,
                Corner::FrontRight,
                Corner::Right,
                Corner::BackRight,
            ],
        }
    }

    pub fn is_holonomic(self) -> bool {
        !matches!(self, DrivetrainTopology::Tank)
    }

    /// Group whose first motor backs encoder-based tracking for `side`
    pub fn sensored_corner(self, side: Side) -> Option<Corner> {
        match (self, side) {
            (DrivetrainTopology::Tank | DrivetrainTopology::Asterisk, Side::Left) => Some(Corner::Left),
            (DrivetrainTopology::Tank | DrivetrainTopology::Asterisk, Side::Right) => Some(Corner::Right),
            (DrivetrainTopology::XDrive | DrivetrainTopology::Mecanum, Side::Left) => Some(Corner::FrontLeft),
            (DrivetrainTopology::XDrive | DrivetrainTopology::Mecanum, Side::Right) => Some(Corner::FrontRight),
            (DrivetrainTopology::HDrive, Side::Left) => Some(Corner::Left),
            (DrivetrainTopology::HDrive, Side::Right) => Some(Corner::Right),
            (DrivetrainTopology::HDrive, Side::Center) => Some(Corner::Center),
            (_, Side::Center) => None,
        }
    }

    /// Check the supplied motor groups match this topology exactly
    pub fn validate_corners(self, supplied: &[Corner]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for corner in supplied {
            if !seen.insert(*corner) {
                return Err(ChassisError::Configuration(format!(
                    "motor group '{corner}' given more than once"
                )));
            }
        }

        let required: BTreeSet<Corner> = self.corners().iter().copied().collect();
        if seen != required {
            let missing: Vec<String> = required.difference(&seen).map(ToString::to_string).collect();
            let extra: Vec<String> = seen.difference(&required).map(ToString::to_string).collect();
            return Err(ChassisError::Configuration(format!(
                "{self:?} needs {} motor groups (missing: [{}], unexpected: [{}])",
                required.len(),
                missing.join(", "),
                extra.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_counts() {
        assert_eq!(DrivetrainTopology::Tank.corners().len(), 2);
        assert_eq!(DrivetrainTopology::XDrive.corners().len(), 4);
        assert_eq!(DrivetrainTopology::Mecanum.corners().len(), 4);
        assert_eq!(DrivetrainTopology::HDrive.corners().len(), 3);
        assert_eq!(DrivetrainTopology::Asterisk.corners().len(), 6);
    }

    #[test]
    fn test_validate_accepts_any_order() {
        let supplied = [Corner::BackRight, Corner::FrontLeft, Corner::BackLeft, Corner::FrontRight];
        assert!(DrivetrainTopology::Mecanum.validate_corners(&supplied).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_group_count() {
        let tank_groups = [Corner::Left, Corner::Right];
        let err = DrivetrainTopology::XDrive.validate_corners(&tank_groups).unwrap_err();
        println!("{err}");
        assert!(matches!(err, ChassisError::Configuration(_)));

        let h_missing_center = [Corner::Left, Corner::Right];
        assert!(DrivetrainTopology::HDrive.validate_corners(&h_missing_center).is_err());

        let duplicated = [Corner::Left, Corner::Left, Corner::Right];
        assert!(DrivetrainTopology::Tank.validate_corners(&duplicated).is_err());
    }

    #[test]
    fn test_every_topology_has_left_and_right_sensors() {
        for topology in [
            DrivetrainTopology::Tank,
            DrivetrainTopology::XDrive,
            DrivetrainTopology::Mecanum,
            DrivetrainTopology::HDrive,
            DrivetrainTopology::Asterisk,
        ] {
            for side in [Side::Left, Side::Right] {
                let corner = topology.sensored_corner(side).unwrap();
                assert!(topology.corners().contains(&corner));
                assert_eq!(corner.side(), side);
            }
        }
        assert_eq!(DrivetrainTopology::HDrive.sensored_corner(Side::Center), Some(Corner::Center));
        assert_eq!(DrivetrainTopology::Tank.sensored_corner(Side::Center), None);
    }
}
