pub mod chassis;
pub mod control;
pub mod geometry;
pub mod motor_group;
pub mod odometry;
pub mod port;
pub mod topology;

pub use chassis::Chassis;
pub use control::{AxisScale, ArcadeSticks, ControllerMapping, DeadbandPolicy, StickLayout};
pub use geometry::{derive_ticks, CartridgeSetting, DriveGeometry, GearCartridge, TickConstants, TrackerGeometry};
pub use motor_group::MotorGroup;
pub use odometry::{Odometry, OdometrySource, TrackerConfig, TrackerKind};
pub use port::{PortConfig, PortSpec};
pub use topology::{Corner, DrivetrainTopology, Side, SwingSide};
