//! Simulation configuration.
//!
//! The caller hands the core an opaque nested mapping (typically parsed from
//! YAML by an outer layer); [`Config::from_value`] turns it into a typed tree.
//! Every key has a documented default, so an empty mapping is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::util::Interval;

/// A configuration error, raised at construction time and never during `step`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid track geometry parameters.
    Track(String),
    /// A vehicle mix entry names a kind with no catalog entry.
    UnknownVehicleKind(String),
    /// The vehicle mix has no entries with positive weight.
    EmptyMix,
    /// Malformed driver correlation entry.
    Correlation(String),
    /// Malformed driver parameter distribution.
    Distribution(String),
    /// The opaque mapping did not match the config schema.
    Value(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Track(msg) => write!(f, "invalid track config: {}", msg),
            ConfigError::UnknownVehicleKind(kind) => {
                write!(f, "unknown vehicle kind in mix: {:?}", kind)
            }
            ConfigError::EmptyMix => write!(f, "vehicle mix has no positive weights"),
            ConfigError::Correlation(msg) => write!(f, "invalid correlation: {}", msg),
            ConfigError::Distribution(msg) => write!(f, "invalid distribution: {}", msg),
            ConfigError::Value(msg) => write!(f, "malformed config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub track: TrackConfig,
    pub vehicles: VehiclesConfig,
    pub physics: PhysicsConfig,
    pub drivers: DriversConfig,
    pub collisions: CollisionsConfig,
    pub perception: PerceptionConfig,
    pub random: RandomConfig,
    pub high_performance: HighPerformanceConfig,
    pub data_manager: DataManagerConfig,
}

impl Config {
    /// Builds a config from an opaque nested mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Value(e.to_string()))
    }
}

/// Closed stadium track geometry and safety design parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Total centreline length in m.
    pub length_m: f64,
    /// Fraction of the total length made up by the two straights, in `[0, 1)`.
    pub straight_fraction: f64,
    /// Design speed used by the safety panel, in km/h.
    pub safety_design_speed_kmh: f64,
    /// Superelevation rate `e` of the curves.
    pub superelevation_e: f64,
    /// Side friction factor `f` of the curves.
    pub side_friction_f: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            length_m: 1000.0,
            straight_fraction: 0.3,
            safety_design_speed_kmh: 100.0,
            superelevation_e: 0.06,
            side_friction_f: 0.12,
        }
    }
}

/// The vehicle population.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VehiclesConfig {
    /// Number of vehicles to spawn.
    pub count: usize,
    /// Relative weights of catalog kinds, e.g. `{"sedan": 0.6, "truck": 0.4}`.
    pub mix: BTreeMap<String, f64>,
    /// Seed consumed by the (external) renderer for body colours.
    /// Accepted here so a full config round-trips; the core ignores it.
    pub color_random_seed: u64,
}

impl Default for VehiclesConfig {
    fn default() -> Self {
        let mut mix = BTreeMap::new();
        mix.insert("sedan".to_string(), 0.6);
        mix.insert("suv".to_string(), 0.25);
        mix.insert("truck".to_string(), 0.15);
        Self {
            count: 20,
            mix,
            color_random_seed: 0,
        }
    }
}

/// Integration timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Base time step in s.
    pub delta_t_s: f64,
    /// Multiplier applied to `dt` for faster-than-real-time runs.
    pub speed_factor: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            delta_t_s: 0.02,
            speed_factor: 1.0,
        }
    }
}

/// The marginal distribution of one sampled driver parameter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ParamDistribution {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ParamDistribution {
    pub const fn new(mean: f64, std: f64, min: f64, max: f64) -> Self {
        Self {
            mean,
            std,
            min,
            max,
        }
    }

    /// The truncation range as an interval.
    pub const fn range(&self) -> Interval<f64> {
        Interval::new(self.min, self.max)
    }
}

/// One off-diagonal entry of the driver correlation matrix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub a: String,
    pub b: String,
    pub rho: f64,
}

/// Global IDM parameters shared by all drivers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdmConfig {
    /// Maximum acceleration `a_max` in m/s^2.
    pub a_max: f64,
    /// Free-speed exponent `delta`.
    pub delta: f64,
}

impl Default for IdmConfig {
    fn default() -> Self {
        Self {
            a_max: 1.8,
            delta: 4.0,
        }
    }
}

/// Base rates of the two-state speeding process, per second.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedingConfig {
    /// Base compliant -> speeding rate in 1/s.
    pub lambda_on: f64,
    /// Base speeding -> compliant rate in 1/s.
    pub lambda_off: f64,
}

impl Default for SpeedingConfig {
    fn default() -> Self {
        Self {
            lambda_on: 0.01,
            lambda_off: 0.03,
        }
    }
}

/// Driver behaviour sampling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    /// Marginal distributions keyed by parameter name.
    /// Unnamed parameters fall back to built-in defaults.
    pub distributions: BTreeMap<String, ParamDistribution>,
    /// Off-diagonal correlation entries; the matrix is symmetric with a
    /// unit diagonal.
    pub correlations: Vec<CorrelationPair>,
    pub idm: IdmConfig,
    pub speeding: SpeedingConfig,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            distributions: BTreeMap::new(),
            correlations: vec![
                CorrelationPair {
                    a: "aggression".into(),
                    b: "headway".into(),
                    rho: -0.5,
                },
                CorrelationPair {
                    a: "aggression".into(),
                    b: "comfort_brake".into(),
                    rho: 0.4,
                },
                CorrelationPair {
                    a: "rule_adherence".into(),
                    b: "aggression".into(),
                    rho: -0.45,
                },
            ],
            idm: IdmConfig::default(),
            speeding: SpeedingConfig::default(),
        }
    }
}

/// Collision detection and response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionsConfig {
    /// Apply a momentum-exchange impulse to colliding pairs.
    pub impulse_enabled: bool,
    /// How long a collided vehicle stays disabled, in s.
    pub disable_time_s: f64,
    /// Push overlapping vehicles apart along the arc.
    pub lateral_push: bool,
    /// Use the predicted-collision min-heap instead of dense pair scans.
    pub event_scheduler_enabled: bool,
    /// In dense mode, only examine arc-adjacent pairs.
    pub prefilter_enabled: bool,
    /// Extra separation below which contact is declared, in m.
    pub contact_threshold_m: f64,
    /// Prediction horizon of the scheduler, in s.
    pub horizon_s: f64,
}

impl Default for CollisionsConfig {
    fn default() -> Self {
        Self {
            impulse_enabled: true,
            disable_time_s: 3.0,
            lateral_push: true,
            event_scheduler_enabled: false,
            prefilter_enabled: true,
            contact_threshold_m: 0.3,
            horizon_s: 10.0,
        }
    }
}

/// Leader perception.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Restrict the leader scan to the nearest ring neighbours.
    pub window_enabled: bool,
    /// Number of downstream neighbours scanned in windowed mode.
    pub window_neighbors: usize,
    /// Maximum distance at which a leader can be seen, in m.
    pub visual_range_m: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            window_enabled: false,
            window_neighbors: 8,
            visual_range_m: 150.0,
        }
    }
}

/// Seeding of the simulation's RNG stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    pub master_seed: u64,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self { master_seed: 42 }
    }
}

/// Optional fast paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPerformanceConfig {
    pub enabled: bool,
    /// Integrate and command accelerations through the array path.
    pub idm_vectorized: bool,
}

/// Time-series analytics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataManagerConfig {
    pub enabled: bool,
    /// Oldest samples are dropped beyond this count.
    pub max_samples: usize,
}

impl Default for DataManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_samples: 100_000,
        }
    }
}
