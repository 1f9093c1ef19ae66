// Wheel geometry and tick conversion
// Turns wheel diameter, gear ratio and motor cartridge into ticks-per-revolution
// and ticks-per-inch constants.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChassisError, Result};

/// Native encoder resolution of each cartridge, ticks per output revolution
const LOW_TICKS: u32 = 200;
const MID_TICKS: u32 = 600;
const HIGH_TICKS: u32 = 1800;

/// Interchangeable motor gearset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearCartridge {
    Low,
    Mid,
    High,
}

impl GearCartridge {
    pub const ALL: [GearCartridge; 3] = [GearCartridge::Low, GearCartridge::Mid, GearCartridge::High];

    pub const fn native_ticks(self) -> u32 {
        match self {
            GearCartridge::Low => LOW_TICKS,
            GearCartridge::Mid => MID_TICKS,
            GearCartridge::High => HIGH_TICKS,
        }
    }

    /// Look a cartridge up by its native tick rate
    pub fn from_native_ticks(ticks: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.native_ticks() == ticks)
            .ok_or_else(|| {
                ChassisError::Configuration(format!("no motor cartridge has a native rate of {ticks} ticks"))
            })
    }
}

impl fmt::Display for GearCartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GearCartridge::Low => "low",
            GearCartridge::Mid => "mid",
            GearCartridge::High => "high",
        };
        write!(f, "{name}")
    }
}

impl FromStr for GearCartridge {
    type Err = ChassisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(GearCartridge::Low),
            "mid" => Ok(GearCartridge::Mid),
            "high" => Ok(GearCartridge::High),
            other => Err(ChassisError::Configuration(format!("unknown motor cartridge '{other}'"))),
        }
    }
}

/// Cartridge as written in a config file: a name or a native tick rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CartridgeSetting {
    Named(GearCartridge),
    NativeTicks(u32),
}

impl CartridgeSetting {
    pub fn resolve(self) -> Result<GearCartridge> {
        match self {
            CartridgeSetting::Named(cartridge) => Ok(cartridge),
            CartridgeSetting::NativeTicks(ticks) => GearCartridge::from_native_ticks(ticks),
        }
    }
}

/// Derived conversion constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickConstants {
    pub ticks_per_revolution: f64,
    pub ticks_per_inch: f64,
}

impl TickConstants {
    pub fn ticks_to_inches(&self, ticks: f64) -> f64 {
        ticks / self.ticks_per_inch
    }
}

/// ticks/rev = native(cartridge) * gear ratio; ticks/inch = ticks/rev / (diameter * pi)
pub fn derive_ticks(wheel_diameter: f64, gear_ratio: f64, cartridge: GearCartridge) -> Result<TickConstants> {
    if !(wheel_diameter.is_finite() && wheel_diameter > 0.0) {
        return Err(ChassisError::Configuration(format!(
            "wheel diameter must be positive, got {wheel_diameter}"
        )));
    }
    if !(gear_ratio.is_finite() && gear_ratio > 0.0) {
        return Err(ChassisError::Configuration(format!(
            "gear ratio must be positive, got {gear_ratio}"
        )));
    }

    let ticks_per_revolution = cartridge.native_ticks() as f64 * gear_ratio;
    Ok(TickConstants {
        ticks_per_revolution,
        ticks_per_inch: ticks_per_revolution / (wheel_diameter * PI),
    })
}

/// Drive wheels as mounted on the motors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    pub wheel_diameter: f64,
    pub gear_ratio: f64,
    pub cartridge: GearCartridge,
}

impl DriveGeometry {
    pub fn new(wheel_diameter: f64, gear_ratio: f64, cartridge: GearCartridge) -> Self {
        Self {
            wheel_diameter,
            gear_ratio,
            cartridge,
        }
    }

    pub fn wheel_circumference(&self) -> f64 {
        self.wheel_diameter * PI
    }

    pub fn ticks(&self) -> Result<TickConstants> {
        derive_ticks(self.wheel_diameter, self.gear_ratio, self.cartridge)
    }
}

/// Unpowered tracking (dead) wheel, geared independently of the drive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerGeometry {
    pub diameter: f64,
    #[serde(default = "unit_ratio")]
    pub gear_ratio: f64,
}

fn unit_ratio() -> f64 {
    1.0
}

impl TrackerGeometry {
    pub fn wheel_circumference(&self) -> f64 {
        self.diameter * PI
    }

    /// Tracking wheels share the drive cartridge's native rate but use their own wheel and gearing
    pub fn ticks(&self, cartridge: GearCartridge) -> Result<TickConstants> {
        derive_ticks(self.diameter, self.gear_ratio, cartridge)
    }
}

impl From<&DriveGeometry> for TrackerGeometry {
    fn from(drive: &DriveGeometry) -> Self {
        Self {
            diameter: drive.wheel_diameter,
            gear_ratio: drive.gear_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_drive_mid_cartridge() {
        let ticks = derive_ticks(3.25, 1.0, GearCartridge::Mid).unwrap();
        assert_eq!(ticks.ticks_per_revolution, 600.0);
        println!("ticks/inch = {}", ticks.ticks_per_inch);
        assert!((ticks.ticks_per_inch - 58.76).abs() < 0.01);
    }

    #[test]
    fn test_ticks_per_inch_relation_holds() {
        for cartridge in GearCartridge::ALL {
            for diameter in [2.0, 2.75, 3.25, 4.0] {
                for ratio in [0.6, 1.0, 1.667, 5.0] {
                    let ticks = derive_ticks(diameter, ratio, cartridge).unwrap();
                    assert!(ticks.ticks_per_revolution > 0.0);
                    assert!(ticks.ticks_per_inch > 0.0);
                    let expected = ticks.ticks_per_revolution / (diameter * PI);
                    assert!((ticks.ticks_per_inch - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_scales_with_gear_ratio() {
        let one = derive_ticks(4.0, 1.0, GearCartridge::Low).unwrap();
        let two = derive_ticks(4.0, 2.0, GearCartridge::Low).unwrap();
        assert_eq!(two.ticks_per_revolution, 2.0 * one.ticks_per_revolution);
    }

    #[test]
    fn test_zero_diameter_is_configuration_error() {
        let err = derive_ticks(0.0, 1.0, GearCartridge::Mid).unwrap_err();
        assert!(matches!(err, ChassisError::Configuration(_)));
        assert!(derive_ticks(f64::NAN, 1.0, GearCartridge::Mid).is_err());
        assert!(derive_ticks(3.25, 0.0, GearCartridge::Mid).is_err());
        assert!(derive_ticks(3.25, -1.0, GearCartridge::Mid).is_err());
    }

    #[test]
    fn test_unknown_native_rate_is_rejected() {
        assert_eq!(GearCartridge::from_native_ticks(600).unwrap(), GearCartridge::Mid);
        let err = GearCartridge::from_native_ticks(450).unwrap_err();
        assert!(matches!(err, ChassisError::Configuration(_)));
    }

    #[test]
    fn test_cartridge_setting_forms() {
        let named: CartridgeSetting = serde_json::from_str(r#""high""#).unwrap();
        assert_eq!(named.resolve().unwrap(), GearCartridge::High);
        let native: CartridgeSetting = serde_json::from_str("200").unwrap();
        assert_eq!(native.resolve().unwrap(), GearCartridge::Low);
        let bogus: CartridgeSetting = serde_json::from_str("123").unwrap();
        assert!(bogus.resolve().is_err());
        assert!("turbo".parse::<GearCartridge>().is_err());
        assert_eq!("MID".parse::<GearCartridge>().unwrap(), GearCartridge::Mid);
    }

    #[test]
    fn test_tracker_uses_its_own_wheel() {
        let drive = DriveGeometry::new(4.0, 1.0, GearCartridge::Mid);
        let tracker = TrackerGeometry {
            diameter: 2.0,
            gear_ratio: 1.0,
        };
        let drive_ticks = drive.ticks().unwrap();
        let tracker_ticks = tracker.ticks(drive.cartridge).unwrap();
        assert_eq!(drive_ticks.ticks_per_revolution, tracker_ticks.ticks_per_revolution);
        assert!((tracker_ticks.ticks_per_inch - 2.0 * drive_ticks.ticks_per_inch).abs() < 1e-9);

        // Without a tracking wheel the drive geometry is reused as-is
        let reused = TrackerGeometry::from(&drive).ticks(drive.cartridge).unwrap();
        assert_eq!(reused, drive_ticks);
    }
}
