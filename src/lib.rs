pub use analytics::{Analytics, TickSample};
pub use cgmath;
pub use collision::{CollisionEvent, CollisionType};
pub use config::{Config, ConfigError};
pub use driver::{Driver, DriverParams, SpeedingState};
pub use perception::PerceptionData;
pub use simulation::{SafetyPanel, Simulation};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use track::Track;
pub use util::Interval;
pub use vehicle::{Vehicle, VehicleSpec};

mod analytics;
mod collision;
pub mod config;
mod driver;
mod idm;
pub mod math;
mod perception;
mod physics;
mod simulation;
mod track;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
