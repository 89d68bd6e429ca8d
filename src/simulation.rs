//! The simulation orchestrator.

use crate::analytics::Analytics;
use crate::collision::{CollisionEvent, CollisionSystem};
use crate::config::{Config, ConfigError};
use crate::driver::{Driver, DriverSampler};
use crate::idm::{idm_accel, idm_accel_batch};
use crate::perception::PerceptionSystem;
use crate::physics::ArcArrays;
use crate::track::Track;
use crate::vehicle::{catalog_spec, Vehicle};
use crate::{VehicleId, VehicleSet};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use slotmap::SecondaryMap;

/// Curve-safety figures derived from the track geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafetyPanel {
    /// The track's curve radius in m.
    pub radius_m: f64,
    /// Maximum safe curve speed in km/h.
    pub v_safe_kmh: f64,
    /// Track length that would support the design speed, in m.
    pub length_needed_m: f64,
    /// Whether the design speed exceeds the safe curve speed.
    pub is_unsafe: bool,
}

/// A microscopic traffic simulation on a closed stadium track.
pub struct Simulation {
    config: Config,
    track: Track,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// Vehicle IDs in spawn order; the dense index used by the array path
    /// and the collision scheduler.
    ids: Vec<VehicleId>,
    index_of: SecondaryMap<VehicleId, usize>,
    /// Vehicle IDs sorted by arc position, refreshed every tick.
    order: Vec<VehicleId>,
    perception: PerceptionSystem,
    collision: CollisionSystem,
    arrays: ArcArrays,
    analytics: Analytics,
    rng: StdRng,
    /// Simulation clock in s.
    time_s: f64,
    /// The current frame of simulation.
    frame: usize,
}

impl Simulation {
    /// Creates a simulation from a validated config.
    ///
    /// Misconfiguration is rejected here; a constructed simulation never
    /// raises during [step](Self::step).
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let track = Track::new(&config.track)?;
        let sampler = DriverSampler::new(&config.drivers)?;

        // Resolve the vehicle mix against the catalog
        let mut kinds = Vec::new();
        let mut weights = Vec::new();
        for (name, weight) in &config.vehicles.mix {
            let spec = catalog_spec(name)
                .ok_or_else(|| ConfigError::UnknownVehicleKind(name.clone()))?;
            if *weight > 0.0 {
                kinds.push(spec);
                weights.push(*weight);
            }
        }
        let mix = WeightedIndex::new(&weights).map_err(|_| ConfigError::EmptyMix)?;

        let mut rng = StdRng::seed_from_u64(config.random.master_seed);
        let mut vehicles = VehicleSet::default();
        let mut ids = Vec::with_capacity(config.vehicles.count);
        let mut index_of = SecondaryMap::new();
        let n = config.vehicles.count;
        for i in 0..n {
            let spec = kinds[mix.sample(&mut rng)];
            let params = sampler.sample(&mut rng);
            let s = i as f64 * track.length() / n.max(1) as f64;
            let v = 0.5 * params.desired_speed_mps;
            let id = vehicles
                .insert_with_key(|id| Vehicle::new(id, spec, Driver::new(params), s, v));
            index_of.insert(id, i);
            ids.push(id);
        }

        let arrays = ArcArrays::build(&ids, &vehicles);
        Ok(Self {
            track,
            vehicles,
            order: ids.clone(),
            index_of,
            perception: PerceptionSystem::new(&config.perception),
            collision: CollisionSystem::new(&config.collisions, ids.len()),
            arrays,
            analytics: Analytics::new(&config.data_manager),
            ids,
            rng,
            time_s: 0.0,
            frame: 0,
            config: config.clone(),
        })
    }

    /// Advances the simulation by `dt` seconds (scaled by the configured
    /// speed factor).
    pub fn step(&mut self, dt_s: f64) {
        let dt = dt_s * self.config.physics.speed_factor;
        if dt <= 0.0 || self.ids.is_empty() {
            return;
        }
        let now = self.time_s + dt;

        self.refresh_order();
        self.perception
            .update_all(&self.order, &mut self.vehicles, self.track.length());
        self.update_speeding(dt);
        self.apply_accelerations(dt);
        self.integrate(dt);
        self.refresh_order();
        self.collision.step(
            now,
            dt,
            &self.order,
            &self.ids,
            &self.index_of,
            &mut self.vehicles,
            &self.track,
            self.config.drivers.idm.a_max,
        );
        self.analytics.record(
            now,
            &self.order,
            &self.vehicles,
            self.track.length(),
            self.collision.get_collision_events().len(),
        );
        self.time_s = now;
        self.frame += 1;
    }

    /// Sorts the arc-position vehicle ordering.
    fn refresh_order(&mut self) {
        let vehicles = &self.vehicles;
        self.order
            .sort_by(|a, b| vehicles[*a].pos().total_cmp(&vehicles[*b].pos()));
    }

    /// Advances every driver's speeding process.
    fn update_speeding(&mut self, dt: f64) {
        let speeding = self.config.drivers.speeding.clone();
        for id in &self.ids {
            self.vehicles[*id]
                .driver_mut()
                .update_speeding_state(dt, &speeding, &mut self.rng);
        }
    }

    /// Computes and commands each vehicle's IDM acceleration.
    fn apply_accelerations(&mut self, dt: f64) {
        let hp = &self.config.high_performance;
        if hp.enabled && hp.idm_vectorized {
            self.apply_accelerations_batch();
        } else {
            self.apply_accelerations_scalar();
        }
        for id in &self.ids {
            self.vehicles[*id].update_internal_state(dt);
        }
    }

    /// The speed limit every driver is nominally subject to, in m/s.
    fn speed_limit_mps(&self) -> f64 {
        self.config.track.safety_design_speed_kmh / 3.6
    }

    fn apply_accelerations_scalar(&mut self) {
        let n = self.ids.len();
        let limit = self.speed_limit_mps();
        let idm = &self.config.drivers.idm;
        let track_len = self.track.length();

        let mut commands = Vec::with_capacity(n);
        for id in &self.ids {
            let veh = &self.vehicles[*id];
            if veh.is_disabled(self.time_s) {
                commands.push((*id, -veh.driver().params().comfort_brake_mps2));
                continue;
            }
            let p = veh.driver().params();
            let v0 = p.desired_speed_mps.min(veh.driver().effective_speed_limit(limit));
            let (gap, v_leader) = match veh.perception().leader {
                Some(leader_id) => (
                    veh.perception().leader_distance_m,
                    self.vehicles[leader_id].vel(),
                ),
                None => {
                    // Ring fallback: the next vehicle by spawn index
                    let i = self.index_of[*id];
                    let j = (i + 1) % n;
                    let leader = &self.vehicles[self.ids[j]];
                    let gap = if i == j {
                        track_len - 2.0 * veh.half_len()
                    } else {
                        crate::math::forward_gap(veh.pos(), leader.pos(), track_len)
                            - veh.half_len()
                            - leader.half_len()
                    };
                    (gap.max(0.0), leader.vel())
                }
            };
            let accel = idm_accel(
                veh.vel(),
                v_leader,
                gap,
                v0,
                p.headway_t_s,
                p.comfort_brake_mps2,
                idm.a_max,
                idm.delta,
            );
            commands.push((*id, accel));
        }
        for (id, accel) in commands {
            self.vehicles[id].command_accel(accel);
        }
    }

    /// Batch IDM over the struct-of-arrays mirror.
    fn apply_accelerations_batch(&mut self) {
        let n = self.arrays.len();
        let limit = self.speed_limit_mps();
        let idm = self.config.drivers.idm.clone();
        let track_len = self.track.length();

        self.arrays.gather(&self.vehicles);
        for i in 0..n {
            let veh = &self.vehicles[self.ids[i]];
            let p = veh.driver().params();
            self.arrays.v0[i] = p.desired_speed_mps.min(veh.driver().effective_speed_limit(limit));
            self.arrays.leader[i] = veh
                .perception()
                .leader
                .map(|id| self.index_of[id])
                .unwrap_or((i + 1) % n);
        }
        let ArcArrays {
            commanded,
            s,
            v,
            half_len,
            leader,
            v0,
            headway,
            comfort_brake,
            ..
        } = &mut self.arrays;
        idm_accel_batch(
            commanded,
            s,
            v,
            half_len,
            leader,
            v0,
            headway,
            comfort_brake,
            idm.a_max,
            idm.delta,
            track_len,
        );
        for i in 0..n {
            let id = self.ids[i];
            let command = if self.vehicles[id].is_disabled(self.time_s) {
                -self.vehicles[id].driver().params().comfort_brake_mps2
            } else {
                self.arrays.commanded[i]
            };
            self.vehicles[id].command_accel(command);
        }
    }

    /// Integrates all vehicle kinematics, scalar or vectorized.
    fn integrate(&mut self, dt: f64) {
        let track_len = self.track.length();
        if self.config.high_performance.enabled {
            self.arrays.gather(&self.vehicles);
            self.arrays.step_arc_kinematics(dt, track_len);
            self.arrays.scatter(&mut self.vehicles);
        } else {
            for id in &self.ids {
                self.vehicles[*id].integrate(dt, track_len);
            }
        }
    }

    /// Derives the curve-safety panel from the track and design speed.
    pub fn compute_safety_panel(&self) -> SafetyPanel {
        let e = self.config.track.superelevation_e;
        let f = self.config.track.side_friction_f;
        let design = self.config.track.safety_design_speed_kmh;
        let v_safe_kmh = self.track.safe_speed_kmh(e, f);
        let radius_needed = Track::safe_radius_min_m(design, e, f);
        SafetyPanel {
            radius_m: self.track.radius_m(),
            v_safe_kmh,
            length_needed_m: self.track.needed_length_for_radius_m(radius_needed),
            is_unsafe: design > v_safe_kmh,
        }
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The simulation clock in s.
    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// The simulated track.
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.ids.iter().map(move |id| &self.vehicles[*id])
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> &Vehicle {
        &self.vehicles[vehicle_id]
    }

    /// The accumulated collision events.
    pub fn collision_events(&self) -> &[CollisionEvent] {
        self.collision.get_collision_events()
    }

    /// Drops collision events older than the given timestamp.
    pub fn prune_collision_events_before(&mut self, timestamp_s: f64) {
        self.collision.prune_events_before(timestamp_s)
    }

    /// The recorded analytics time series.
    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }
}
