//! Struct-of-arrays kinematics for the high-performance path.
//!
//! The arrays mirror the vehicle set in a fixed index order established at
//! spawn (vehicles are never removed). Each tick the simulation gathers
//! mutable state in, integrates every lane at once, and scatters back.

use crate::math::wrap_pos;
use crate::{VehicleId, VehicleSet};

/// Parallel per-vehicle arrays for batch IDM and integration.
#[derive(Clone, Debug, Default)]
pub(crate) struct ArcArrays {
    /// Vehicle IDs in array index order.
    pub ids: Vec<VehicleId>,
    /// Arc positions in m.
    pub s: Vec<f64>,
    /// Speeds in m/s.
    pub v: Vec<f64>,
    /// Visible accelerations in m/s^2.
    pub a: Vec<f64>,
    /// Half lengths in m (immutable after spawn).
    pub half_len: Vec<f64>,
    /// Effective desired speeds in m/s (refreshed per tick).
    pub v0: Vec<f64>,
    /// Desired time headways in s (immutable after spawn).
    pub headway: Vec<f64>,
    /// Comfortable braking decelerations in m/s^2 (immutable after spawn).
    pub comfort_brake: Vec<f64>,
    /// Each follower's leader index (self for a free ring).
    pub leader: Vec<usize>,
    /// Commanded accelerations computed by the batch IDM.
    pub commanded: Vec<f64>,
}

impl ArcArrays {
    /// Builds the arrays from the spawned vehicle set.
    pub fn build(ids: &[VehicleId], vehicles: &VehicleSet) -> Self {
        let n = ids.len();
        let mut arrays = Self {
            ids: ids.to_vec(),
            s: vec![0.0; n],
            v: vec![0.0; n],
            a: vec![0.0; n],
            half_len: vec![0.0; n],
            v0: vec![0.0; n],
            headway: vec![0.0; n],
            comfort_brake: vec![0.0; n],
            leader: (0..n).collect(),
            commanded: vec![0.0; n],
        };
        for (i, id) in ids.iter().enumerate() {
            let veh = &vehicles[*id];
            let p = veh.driver().params();
            arrays.half_len[i] = veh.half_len();
            arrays.headway[i] = p.headway_t_s;
            arrays.comfort_brake[i] = p.comfort_brake_mps2;
            arrays.v0[i] = p.desired_speed_mps;
        }
        arrays
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Copies mutable kinematic state in from the vehicle set.
    pub fn gather(&mut self, vehicles: &VehicleSet) {
        for (i, id) in self.ids.iter().enumerate() {
            let veh = &vehicles[*id];
            self.s[i] = veh.pos();
            self.v[i] = veh.vel();
            self.a[i] = veh.accel();
        }
    }

    /// Integrates all lanes: `v <- max(v + a dt, 0)`, `s <- (s + v dt) mod L`.
    pub fn step_arc_kinematics(&mut self, dt: f64, track_len: f64) {
        for i in 0..self.v.len() {
            self.v[i] = (self.v[i] + self.a[i] * dt).max(0.0);
        }
        for i in 0..self.s.len() {
            self.s[i] = wrap_pos(self.s[i] + self.v[i] * dt, track_len);
        }
    }

    /// Writes positions and speeds back to the vehicle set.
    pub fn scatter(&self, vehicles: &mut VehicleSet) {
        for (i, id) in self.ids.iter().enumerate() {
            vehicles[*id].set_kinematics(self.s[i], self.v[i]);
        }
    }
}
