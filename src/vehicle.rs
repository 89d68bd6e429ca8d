//! Simulated vehicles: physical specs, kinematic state, actuation.

use self::actuation::ActuationState;
use crate::driver::Driver;
use crate::math::wrap_pos;
use crate::perception::PerceptionData;
use crate::VehicleId;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

pub(crate) mod actuation;

/// Gravitational acceleration in m/s^2.
const GRAVITY: f64 = 9.81;

/// Air density at sea level in kg/m^3.
const AIR_DENSITY: f64 = 1.225;

/// Combined gearbox and final-drive ratio used for the torque-limited
/// acceleration estimate.
const DRIVELINE_RATIO: f64 = 8.0;

/// Effective wheel radius in m.
const WHEEL_RADIUS: f64 = 0.33;

/// Immutable physical dimensions and powertrain figures of a vehicle kind.
#[derive(Clone, Copy, Debug)]
pub struct VehicleSpec {
    /// Overall length in m.
    pub length_m: f64,
    /// Overall width in m.
    pub width_m: f64,
    /// Kerb mass in kg.
    pub mass_kg: f64,
    /// Peak engine power in W.
    pub power_w: f64,
    /// Peak engine torque in Nm.
    pub torque_nm: f64,
    /// Drag coefficient times frontal area, in m^2.
    pub drag_area_cda: f64,
    /// Tire-road friction coefficient.
    pub tire_friction: f64,
    /// Fraction of the friction-limited braking force the brakes deliver.
    pub brake_efficiency: f64,
}

impl VehicleSpec {
    /// The highest acceleration the powertrain can deliver at speed `v`,
    /// limited by torque at low speed, power and drag at high speed, and
    /// traction throughout. Always non-negative.
    pub fn max_tractive_accel(&self, v_mps: f64) -> f64 {
        let torque_limited = self.torque_nm * DRIVELINE_RATIO / (WHEEL_RADIUS * self.mass_kg);
        let drag_force = 0.5 * AIR_DENSITY * self.drag_area_cda * v_mps * v_mps;
        let power_limited = (self.power_w / v_mps.max(1.0) - drag_force) / self.mass_kg;
        let traction_limited = self.tire_friction * GRAVITY;
        torque_limited
            .min(power_limited)
            .min(traction_limited)
            .max(0.0)
    }

    /// The strongest braking deceleration the vehicle can sustain, in
    /// m/s^2 (positive).
    pub fn max_braking_decel(&self) -> f64 {
        self.tire_friction * GRAVITY * self.brake_efficiency
    }
}

/// The built-in vehicle catalog, keyed by kind name.
static CATALOG: Lazy<BTreeMap<&'static str, VehicleSpec>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    map.insert(
        "sedan",
        VehicleSpec {
            length_m: 4.6,
            width_m: 1.8,
            mass_kg: 1500.0,
            power_w: 120_000.0,
            torque_nm: 250.0,
            drag_area_cda: 0.62,
            tire_friction: 0.9,
            brake_efficiency: 0.95,
        },
    );
    map.insert(
        "suv",
        VehicleSpec {
            length_m: 4.9,
            width_m: 2.0,
            mass_kg: 2100.0,
            power_w: 150_000.0,
            torque_nm: 350.0,
            drag_area_cda: 0.95,
            tire_friction: 0.85,
            brake_efficiency: 0.92,
        },
    );
    map.insert(
        "truck",
        VehicleSpec {
            length_m: 9.5,
            width_m: 2.5,
            mass_kg: 12_000.0,
            power_w: 280_000.0,
            torque_nm: 1800.0,
            drag_area_cda: 4.8,
            tire_friction: 0.75,
            brake_efficiency: 0.85,
        },
    );
    map.insert(
        "bus",
        VehicleSpec {
            length_m: 12.0,
            width_m: 2.55,
            mass_kg: 14_000.0,
            power_w: 220_000.0,
            torque_nm: 1600.0,
            drag_area_cda: 5.5,
            tire_friction: 0.75,
            brake_efficiency: 0.85,
        },
    );
    map
});

/// Looks up a catalog entry by kind name.
pub fn catalog_spec(kind: &str) -> Option<VehicleSpec> {
    CATALOG.get(kind).copied()
}

/// Mutable kinematic state, owned by its vehicle.
#[derive(Clone, Copy, Debug, Default)]
pub struct VehicleState {
    /// Arc-length position in m, wraps modulo the track length.
    pub s_m: f64,
    /// Speed in m/s, never negative.
    pub v_mps: f64,
    /// Externally visible acceleration in m/s^2.
    pub a_mps2: f64,
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    spec: VehicleSpec,
    driver: Driver,
    state: VehicleState,
    actuation: ActuationState,
    /// Perception snapshot for the current tick only.
    perception: PerceptionData,
    /// While set, the vehicle ignores driver commands and brakes to rest.
    disabled_until_s: Option<f64>,
}

impl Vehicle {
    /// Creates a new vehicle at the given arc position.
    pub(crate) fn new(id: VehicleId, spec: VehicleSpec, driver: Driver, s_m: f64, v_mps: f64) -> Self {
        Self {
            id,
            spec,
            driver,
            state: VehicleState {
                s_m,
                v_mps,
                a_mps2: 0.0,
            },
            actuation: ActuationState::default(),
            perception: PerceptionData::default(),
            disabled_until_s: None,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's physical spec.
    pub fn spec(&self) -> &VehicleSpec {
        &self.spec
    }

    /// The vehicle's driver.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub(crate) fn driver_mut(&mut self) -> &mut Driver {
        &mut self.driver
    }

    /// The arc-length position of the centre of the vehicle in m.
    pub fn pos(&self) -> f64 {
        self.state.s_m
    }

    /// The vehicle's speed in m/s.
    pub fn vel(&self) -> f64 {
        self.state.v_mps
    }

    /// The externally visible acceleration in m/s^2.
    pub fn accel(&self) -> f64 {
        self.state.a_mps2
    }

    /// Half the vehicle's length in m.
    pub fn half_len(&self) -> f64 {
        0.5 * self.spec.length_m
    }

    /// The perception snapshot computed this tick.
    pub fn perception(&self) -> &PerceptionData {
        &self.perception
    }

    pub(crate) fn set_perception(&mut self, perception: PerceptionData) {
        self.perception = perception;
    }

    /// Whether the vehicle is currently disabled following a collision.
    pub fn is_disabled(&self, now_s: f64) -> bool {
        self.disabled_until_s.map_or(false, |until| now_s < until)
    }

    /// Disables the vehicle until the given simulation time.
    pub(crate) fn disable_until(&mut self, until_s: f64) {
        self.disabled_until_s = Some(until_s);
    }

    /// Clears the disabled flag once its deadline has passed.
    pub(crate) fn refresh_disabled(&mut self, now_s: f64) {
        if self.disabled_until_s.map_or(false, |until| now_s >= until) {
            self.disabled_until_s = None;
        }
    }

    /// Commands an acceleration, clamped to what the powertrain and brakes
    /// can physically deliver.
    pub(crate) fn command_accel(&mut self, accel: f64) {
        let clamped = accel.clamp(
            -self.spec.max_braking_decel(),
            self.spec.max_tractive_accel(self.state.v_mps),
        );
        self.actuation.set_commanded(clamped);
    }

    /// The jerk realized on the last actuation update, in m/s^3.
    pub fn jerk(&self) -> f64 {
        self.actuation.jerk()
    }

    /// Runs the jerk/lag actuation model and refreshes the visible
    /// acceleration.
    pub(crate) fn update_internal_state(&mut self, dt: f64) {
        let p = *self.driver.params();
        self.state.a_mps2 =
            self.actuation
                .update(dt, p.jerk_limit_mps3, p.throttle_lag_s, p.brake_lag_s);
    }

    /// Integrates velocity then position over `dt`, wrapping on the ring.
    pub(crate) fn integrate(&mut self, dt: f64, track_len: f64) {
        self.state.v_mps = (self.state.v_mps + self.state.a_mps2 * dt).max(0.0);
        self.state.s_m = wrap_pos(self.state.s_m + self.state.v_mps * dt, track_len);
    }

    /// Directly overwrites position and velocity (collision response and
    /// the vectorized integration path).
    pub(crate) fn set_kinematics(&mut self, s_m: f64, v_mps: f64) {
        self.state.s_m = s_m;
        self.state.v_mps = v_mps.max(0.0);
    }
}
