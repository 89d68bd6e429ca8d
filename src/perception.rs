//! Leader perception: forward scan, occlusion, stopping sight distance.

use crate::math::forward_gap;
use crate::{VehicleId, VehicleSet};
use smallvec::SmallVec;

/// What one vehicle perceives ahead of it, valid for the current tick only.
///
/// The leader is held as an ID, never a reference: perception is recomputed
/// every tick and must not outlive it.
#[derive(Clone, Copy, Debug)]
pub struct PerceptionData {
    /// The perceived leader, if any lies within visual range.
    pub leader: Option<VehicleId>,
    /// Net bumper-to-bumper distance to the leader in m; 0 when none.
    pub leader_distance_m: f64,
    /// Whether another vehicle sits between follower and leader.
    pub is_occluded: bool,
    /// Stopping sight distance required at the current speed, in m.
    pub ssd_required_m: f64,
    /// The visual range used for the scan, in m.
    pub visual_range_m: f64,
}

impl Default for PerceptionData {
    fn default() -> Self {
        Self {
            leader: None,
            leader_distance_m: 0.0,
            is_occluded: false,
            ssd_required_m: 0.0,
            visual_range_m: 0.0,
        }
    }
}

/// Stopping sight distance from speed, reaction time and comfortable
/// braking capability.
pub fn ssd_required_m(v_mps: f64, reaction_time_s: f64, comfort_brake_mps2: f64) -> f64 {
    v_mps * reaction_time_s + v_mps * v_mps / (2.0 * comfort_brake_mps2.max(1e-6))
}

/// The per-tick perception pass.
pub(crate) struct PerceptionSystem {
    window_enabled: bool,
    window_neighbors: usize,
    visual_range_m: f64,
}

impl PerceptionSystem {
    pub fn new(config: &crate::config::PerceptionConfig) -> Self {
        Self {
            window_enabled: config.window_enabled,
            window_neighbors: config.window_neighbors,
            visual_range_m: config.visual_range_m,
        }
    }

    /// Recomputes perception for every vehicle.
    ///
    /// `order` must hold all vehicle IDs sorted by arc position ascending.
    pub fn update_all(&self, order: &[VehicleId], vehicles: &mut VehicleSet, track_len: f64) {
        let n = order.len();
        let positions: SmallVec<[f64; 64]> = order.iter().map(|id| vehicles[*id].pos()).collect();
        let half_lens: SmallVec<[f64; 64]> =
            order.iter().map(|id| vehicles[*id].half_len()).collect();

        let limit = if self.window_enabled {
            self.window_neighbors.min(n.saturating_sub(1))
        } else {
            n.saturating_sub(1)
        };

        let mut results: SmallVec<[(VehicleId, PerceptionData); 64]> = SmallVec::new();
        for rank in 0..n {
            let id = order[rank];
            let veh = &vehicles[id];
            let p = veh.driver().params();
            let mut data = PerceptionData {
                ssd_required_m: ssd_required_m(
                    veh.vel(),
                    p.reaction_time_s,
                    p.comfort_brake_mps2,
                ),
                visual_range_m: self.visual_range_m,
                ..Default::default()
            };
            self.scan(rank, limit, order, &positions, &half_lens, track_len, &mut data);
            results.push((id, data));
        }

        for (id, data) in results {
            vehicles[id].set_perception(data);
        }
    }

    /// Scans downstream neighbours for the nearest visible leader.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        rank: usize,
        limit: usize,
        order: &[VehicleId],
        positions: &[f64],
        half_lens: &[f64],
        track_len: f64,
        data: &mut PerceptionData,
    ) {
        let n = order.len();
        let own_pos = positions[rank];
        let mut fallback: Option<(usize, f64)> = None;

        for offset in 1..=limit {
            let c = (rank + offset) % n;
            let centre_gap = forward_gap(own_pos, positions[c], track_len);
            // Coincident vehicles are not strictly ahead
            if centre_gap == 0.0 {
                continue;
            }
            if centre_gap > self.visual_range_m {
                break;
            }
            if fallback.is_none() {
                fallback = Some((c, centre_gap));
            }
            if !self.is_occluded(rank, c, centre_gap, positions, track_len) {
                self.select(data, order[c], centre_gap, half_lens[rank], half_lens[c], false);
                return;
            }
            // Keep scanning outward past the occluder
        }

        // Every candidate in range was occluded: take the nearest and flag it
        if let Some((c, centre_gap)) = fallback {
            self.select(data, order[c], centre_gap, half_lens[rank], half_lens[c], true);
        }
    }

    fn select(
        &self,
        data: &mut PerceptionData,
        leader: VehicleId,
        centre_gap: f64,
        own_half_len: f64,
        leader_half_len: f64,
        occluded: bool,
    ) {
        data.leader = Some(leader);
        data.leader_distance_m = (centre_gap - own_half_len - leader_half_len).max(0.0);
        data.is_occluded = occluded;
    }

    /// Whether any third vehicle lies between the follower and candidate.
    ///
    /// Ties at the candidate's exact position count as occluders, so a
    /// coincident stack yields an occluded leader rather than none.
    fn is_occluded(
        &self,
        rank: usize,
        candidate: usize,
        centre_gap: f64,
        positions: &[f64],
        track_len: f64,
    ) -> bool {
        let n = positions.len();
        for offset in 1..n {
            let m = (rank + offset) % n;
            let d = forward_gap(positions[rank], positions[m], track_len);
            if d > centre_gap {
                break;
            }
            if m != candidate && d > 0.0 {
                return true;
            }
        }
        false
    }
}
