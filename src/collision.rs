//! Collision detection, classification, response and event logging.

use self::scheduler::{predict_collision_time, CollisionScheduler};
use crate::config::CollisionsConfig;
use crate::math::{forward_gap, ring_separation, wrap_pos};
use crate::track::Track;
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use slotmap::SecondaryMap;

pub(crate) mod scheduler;

/// Relative-speed threshold above which a contact is classed rear-end, in m/s.
const REAR_END_DV: f64 = 3.0;

/// Heading cosine below which a contact is classed head-on.
const HEAD_ON_COS: f64 = -0.5;

/// The rough class of a collision. Thresholds are heuristic, not contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollisionType {
    RearEnd,
    HeadOn,
    SideSwipe,
}

/// An immutable record of one detected collision.
#[derive(Clone, Copy, Debug)]
pub struct CollisionEvent {
    /// Simulation time of detection, in s.
    pub timestamp_s: f64,
    pub vehicle1: VehicleId,
    pub vehicle2: VehicleId,
    /// Arc position of the contact point, in m.
    pub location_m: f64,
    /// Largest speed change either vehicle experiences, in m/s.
    pub delta_v_mps: f64,
    /// Time to collision at detection; infinite when the pair was not closing.
    pub ttc_at_impact_s: f64,
    pub collision_type: CollisionType,
}

/// Detects and resolves collisions, accumulating an event log.
pub(crate) struct CollisionSystem {
    config: CollisionsConfig,
    events: Vec<CollisionEvent>,
    scheduler: Option<CollisionScheduler>,
}

impl CollisionSystem {
    pub fn new(config: &CollisionsConfig, vehicle_count: usize) -> Self {
        let scheduler = config
            .event_scheduler_enabled
            .then(|| CollisionScheduler::new(vehicle_count, config.horizon_s));
        Self {
            config: config.clone(),
            events: Vec::new(),
            scheduler,
        }
    }

    /// The accumulated collision events, oldest first.
    pub fn get_collision_events(&self) -> &[CollisionEvent] {
        &self.events
    }

    /// Drops events older than the given timestamp.
    pub fn prune_events_before(&mut self, timestamp_s: f64) {
        self.events.retain(|e| e.timestamp_s >= timestamp_s);
    }

    /// Runs one collision pass.
    ///
    /// `order` holds all vehicle IDs sorted by arc position; `ids` is the
    /// fixed spawn-order indexing used by the scheduler; `index_of` maps
    /// IDs back to spawn indices.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        now_s: f64,
        dt: f64,
        order: &[VehicleId],
        ids: &[VehicleId],
        index_of: &SecondaryMap<VehicleId, usize>,
        vehicles: &mut VehicleSet,
        track: &Track,
        a_max: f64,
    ) {
        for id in ids {
            vehicles[*id].refresh_disabled(now_s);
        }
        if order.len() < 2 {
            return;
        }
        if self.scheduler.is_some() {
            self.step_scheduled(now_s, dt, order, ids, index_of, vehicles, track, a_max);
        } else {
            self.step_dense(now_s, order, vehicles, track);
        }
    }

    /// Dense mode: scan vehicle pairs every tick.
    fn step_dense(
        &mut self,
        now_s: f64,
        order: &[VehicleId],
        vehicles: &mut VehicleSet,
        track: &Track,
    ) {
        let n = order.len();
        if self.config.prefilter_enabled {
            // Sorted by arc position, only adjacent pairs can touch
            let ranks = if n == 2 { 1 } else { n };
            for rank in 0..ranks {
                self.resolve_pair(order[rank], order[(rank + 1) % n], now_s, vehicles, track);
            }
        } else {
            let pairs: Vec<(VehicleId, VehicleId)> =
                order.iter().copied().tuple_combinations().collect();
            for (a, b) in pairs {
                self.resolve_pair(a, b, now_s, vehicles, track);
            }
        }
    }

    /// Scheduler mode: only resolve pairs whose predicted collision time
    /// has come due.
    #[allow(clippy::too_many_arguments)]
    fn step_scheduled(
        &mut self,
        now_s: f64,
        dt: f64,
        order: &[VehicleId],
        ids: &[VehicleId],
        index_of: &SecondaryMap<VehicleId, usize>,
        vehicles: &mut VehicleSet,
        track: &Track,
        a_max: f64,
    ) {
        let n = order.len();
        let scheduler = self.scheduler.as_mut().expect("scheduler mode");

        // Refresh adjacency; a reassigned leader bumps the follower's
        // generation and schedules a fresh check.
        for rank in 0..n {
            let f_id = order[rank];
            let l_id = order[(rank + 1) % n];
            if f_id == l_id {
                continue;
            }
            let f = index_of[f_id];
            let l = index_of[l_id];
            if scheduler.leader_of(f) != Some(l) {
                let eta = pair_eta(
                    &vehicles[f_id],
                    &vehicles[l_id],
                    track,
                    a_max,
                    self.config.contact_threshold_m,
                    scheduler.horizon_s(),
                );
                scheduler.set_adjacency(f, l, now_s, eta);
            }
        }

        let due = scheduler.due_followers(now_s);
        for f in due {
            let scheduler = self.scheduler.as_mut().expect("scheduler mode");
            let Some(l) = scheduler.leader_of(f) else {
                continue;
            };
            let f_id = ids[f];
            let l_id = ids[l];
            self.resolve_pair(f_id, l_id, now_s, vehicles, track);
            let eta = pair_eta(
                &vehicles[f_id],
                &vehicles[l_id],
                track,
                a_max,
                self.config.contact_threshold_m,
                self.config.horizon_s,
            );
            // Keep the pair under watch; never re-fire within this tick
            self.scheduler
                .as_mut()
                .expect("scheduler mode")
                .rearm(f, now_s, eta.max(dt));
        }
    }

    /// Checks one pair for contact and applies the full response.
    /// Returns whether a collision was resolved.
    fn resolve_pair(
        &mut self,
        a_id: VehicleId,
        b_id: VehicleId,
        now_s: f64,
        vehicles: &mut VehicleSet,
        track: &Track,
    ) -> bool {
        let track_len = track.length();
        let Some([va, vb]) = vehicles.get_disjoint_mut([a_id, b_id]) else {
            return false;
        };
        // A pair already in a wreck does not produce fresh events
        if va.is_disabled(now_s) || vb.is_disabled(now_s) {
            return false;
        }

        let sep = ring_separation(va.pos(), vb.pos(), track_len);
        let collision_dist = va.half_len() + vb.half_len() + self.config.contact_threshold_m;
        if sep >= collision_dist {
            return false;
        }

        // Orient the pair: `a` is the follower when `b` is closer downstream
        let a_follows_b =
            forward_gap(va.pos(), vb.pos(), track_len) <= forward_gap(vb.pos(), va.pos(), track_len);
        let (follower, leader) = if a_follows_b { (va, vb) } else { (vb, va) };

        let m_f = follower.spec().mass_kg;
        let m_l = leader.spec().mass_kg;
        let v_f = follower.vel();
        let v_l = leader.vel();
        let dv_rel = (v_f - v_l).abs();

        let (_, heading_f) = track.position_heading(follower.pos());
        let (_, heading_l) = track.position_heading(leader.pos());
        let collision_type = if dv_rel > REAR_END_DV {
            CollisionType::RearEnd
        } else if (heading_f - heading_l).cos() < HEAD_ON_COS {
            CollisionType::HeadOn
        } else {
            CollisionType::SideSwipe
        };

        // Perfectly inelastic common velocity
        let v_star = (m_f * v_f + m_l * v_l) / (m_f + m_l);
        let delta_v_mps = (v_f - v_star).abs().max((v_l - v_star).abs());

        let gap_net = sep - follower.half_len() - leader.half_len();
        let closing = v_f - v_l;
        let ttc_at_impact_s = if closing > 1e-6 {
            gap_net.max(0.0) / closing
        } else {
            f64::INFINITY
        };

        let forward = forward_gap(follower.pos(), leader.pos(), track_len);
        let location_m = wrap_pos(follower.pos() + 0.5 * forward, track_len);

        if self.config.impulse_enabled {
            follower.set_kinematics(follower.pos(), v_star);
            leader.set_kinematics(leader.pos(), v_star);
        }
        if self.config.lateral_push {
            let push = 0.5 * (collision_dist - sep);
            let f_pos = wrap_pos(follower.pos() - push, track_len);
            let l_pos = wrap_pos(leader.pos() + push, track_len);
            follower.set_kinematics(f_pos, follower.vel());
            leader.set_kinematics(l_pos, leader.vel());
        }
        let until = now_s + self.config.disable_time_s;
        follower.disable_until(until);
        leader.disable_until(until);

        let event = CollisionEvent {
            timestamp_s: now_s,
            vehicle1: a_id,
            vehicle2: b_id,
            location_m,
            delta_v_mps,
            ttc_at_impact_s,
            collision_type,
        };
        log::debug!(
            "collision at t={:.2}s s={:.1}m type={:?} dv={:.2}m/s",
            now_s,
            location_m,
            collision_type,
            delta_v_mps
        );
        self.events.push(event);
        true
    }
}

/// Conservative time until this follower/leader pair could touch.
fn pair_eta(
    follower: &crate::Vehicle,
    leader: &crate::Vehicle,
    track: &Track,
    a_max: f64,
    contact_threshold_m: f64,
    horizon_s: f64,
) -> f64 {
    let centre_gap = forward_gap(follower.pos(), leader.pos(), track.length());
    let collision_dist = follower.half_len() + leader.half_len() + contact_threshold_m;
    predict_collision_time(
        centre_gap - collision_dist,
        follower.vel(),
        leader.vel(),
        a_max,
        leader.driver().params().max_brake_mps2,
        horizon_s,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::TrackConfig;
    use crate::driver::{Driver, DriverParams};
    use crate::vehicle::{catalog_spec, Vehicle};
    use crate::VehicleSet;

    fn test_params() -> DriverParams {
        DriverParams {
            reaction_time_s: 1.0,
            headway_t_s: 1.5,
            comfort_brake_mps2: 2.5,
            max_brake_mps2: 7.0,
            jerk_limit_mps3: 3.0,
            throttle_lag_s: 0.25,
            brake_lag_s: 0.15,
            aggression_z: 0.0,
            rule_adherence: 0.9,
            desired_speed_mps: 30.0,
        }
    }

    struct Fixture {
        vehicles: VehicleSet,
        ids: Vec<VehicleId>,
        order: Vec<VehicleId>,
        index_of: SecondaryMap<VehicleId, usize>,
        track: Track,
    }

    fn fixture(states: &[(f64, f64)]) -> Fixture {
        let track = Track::new(&TrackConfig::default()).unwrap();
        let mut vehicles = VehicleSet::default();
        let spec = catalog_spec("sedan").unwrap();
        let ids: Vec<VehicleId> = states
            .iter()
            .map(|(s, v)| {
                vehicles.insert_with_key(|id| {
                    Vehicle::new(id, spec, Driver::new(test_params()), *s, *v)
                })
            })
            .collect();
        let mut index_of = SecondaryMap::new();
        for (i, id) in ids.iter().enumerate() {
            index_of.insert(*id, i);
        }
        let mut order = ids.clone();
        order.sort_by(|a, b| vehicles[*a].pos().total_cmp(&vehicles[*b].pos()));
        Fixture {
            vehicles,
            ids,
            order,
            index_of,
            track,
        }
    }

    fn dense_config() -> CollisionsConfig {
        CollisionsConfig::default()
    }

    #[test]
    fn overlapping_pair_collides_and_disables() {
        let mut fx = fixture(&[(0.0, 12.0), (3.0, 1.0)]);
        let mut system = CollisionSystem::new(&dense_config(), 2);
        system.step(
            1.0,
            0.02,
            &fx.order,
            &fx.ids,
            &fx.index_of,
            &mut fx.vehicles,
            &fx.track,
            1.8,
        );
        let events = system.get_collision_events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.timestamp_s, 1.0);
        assert_eq!(e.collision_type, CollisionType::RearEnd);
        assert!(e.delta_v_mps > 0.0);
        assert!(e.ttc_at_impact_s.is_finite());
        for id in &fx.ids {
            assert!(fx.vehicles[*id].is_disabled(1.5));
            assert!(!fx.vehicles[*id].is_disabled(5.0));
        }
        // Impulse merged the velocities
        let v0 = fx.vehicles[fx.ids[0]].vel();
        let v1 = fx.vehicles[fx.ids[1]].vel();
        assert_eq!(v0, v1);
    }

    #[test]
    fn disabled_pair_does_not_recollide() {
        let mut fx = fixture(&[(0.0, 12.0), (3.0, 1.0)]);
        let mut system = CollisionSystem::new(&dense_config(), 2);
        for tick in 0..5 {
            let now = 1.0 + 0.02 * tick as f64;
            system.step(
                now,
                0.02,
                &fx.order,
                &fx.ids,
                &fx.index_of,
                &mut fx.vehicles,
                &fx.track,
                1.8,
            );
        }
        assert_eq!(system.get_collision_events().len(), 1);
    }

    #[test]
    fn coincident_vehicles_collide_immediately() {
        let mut fx = fixture(&[(100.0, 10.0), (100.0, 10.0)]);
        let mut system = CollisionSystem::new(&dense_config(), 2);
        system.step(
            0.0,
            0.02,
            &fx.order,
            &fx.ids,
            &fx.index_of,
            &mut fx.vehicles,
            &fx.track,
            1.8,
        );
        assert_eq!(system.get_collision_events().len(), 1);
        // No NaN from the zero separation
        let e = &system.get_collision_events()[0];
        assert!(e.location_m.is_finite());
    }

    #[test]
    fn lateral_push_restores_separation() {
        let mut config = dense_config();
        config.disable_time_s = 0.0;
        let mut fx = fixture(&[(0.0, 5.0), (3.0, 5.0)]);
        let mut system = CollisionSystem::new(&config, 2);
        system.step(
            0.0,
            0.02,
            &fx.order,
            &fx.ids,
            &fx.index_of,
            &mut fx.vehicles,
            &fx.track,
            1.8,
        );
        let sep = ring_separation(
            fx.vehicles[fx.ids[0]].pos(),
            fx.vehicles[fx.ids[1]].pos(),
            fx.track.length(),
        );
        let spec = catalog_spec("sedan").unwrap();
        assert!(sep >= spec.length_m + config.contact_threshold_m - 1e-9);
    }

    #[test]
    fn far_pairs_do_not_collide() {
        let mut fx = fixture(&[(0.0, 20.0), (500.0, 20.0)]);
        let mut system = CollisionSystem::new(&dense_config(), 2);
        system.step(
            0.0,
            0.02,
            &fx.order,
            &fx.ids,
            &fx.index_of,
            &mut fx.vehicles,
            &fx.track,
            1.8,
        );
        assert!(system.get_collision_events().is_empty());
    }

    #[test]
    fn dense_full_scan_matches_prefilter_on_adjacent_contact() {
        let states = [(0.0, 15.0), (4.0, 0.0), (300.0, 20.0)];
        let mut with_prefilter = fixture(&states);
        let mut without = fixture(&states);
        let mut config = dense_config();
        config.prefilter_enabled = true;
        let mut sys_a = CollisionSystem::new(&config, 3);
        config.prefilter_enabled = false;
        let mut sys_b = CollisionSystem::new(&config, 3);
        sys_a.step(
            0.0,
            0.02,
            &with_prefilter.order,
            &with_prefilter.ids,
            &with_prefilter.index_of,
            &mut with_prefilter.vehicles,
            &with_prefilter.track,
            1.8,
        );
        sys_b.step(
            0.0,
            0.02,
            &without.order,
            &without.ids,
            &without.index_of,
            &mut without.vehicles,
            &without.track,
            1.8,
        );
        assert_eq!(
            sys_a.get_collision_events().len(),
            sys_b.get_collision_events().len()
        );
    }

    #[test]
    fn scheduler_flags_the_same_near_collision() {
        let states = [(0.0, 18.0), (12.0, 0.0)];
        let mut config = dense_config();
        config.event_scheduler_enabled = true;
        let mut fx = fixture(&states);
        let mut system = CollisionSystem::new(&config, 2);
        let dt = 0.05;
        let mut now = 0.0;
        let mut collided = false;
        for _ in 0..100 {
            // Closing at 18 m/s from a 12 m gap: contact within a second
            system.step(
                now,
                dt,
                &fx.order,
                &fx.ids,
                &fx.index_of,
                &mut fx.vehicles,
                &fx.track,
                1.8,
            );
            if !system.get_collision_events().is_empty() {
                collided = true;
                break;
            }
            let ids = fx.ids.clone();
            for id in ids {
                let pos = fx.vehicles[id].pos();
                let vel = fx.vehicles[id].vel();
                fx.vehicles[id].set_kinematics(
                    wrap_pos(pos + vel * dt, fx.track.length()),
                    vel,
                );
            }
            fx.order
                .sort_by(|a, b| fx.vehicles[*a].pos().total_cmp(&fx.vehicles[*b].pos()));
            now += dt;
        }
        assert!(collided, "scheduler missed a closing pair");
    }

    #[test]
    fn pruning_drops_old_events() {
        let mut fx = fixture(&[(0.0, 12.0), (3.0, 1.0)]);
        let mut system = CollisionSystem::new(&dense_config(), 2);
        system.step(
            1.0,
            0.02,
            &fx.order,
            &fx.ids,
            &fx.index_of,
            &mut fx.vehicles,
            &fx.track,
            1.8,
        );
        assert_eq!(system.get_collision_events().len(), 1);
        system.prune_events_before(2.0);
        assert!(system.get_collision_events().is_empty());
    }
}
