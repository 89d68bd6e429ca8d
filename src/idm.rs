//! Intelligent Driver Model acceleration, scalar and batch forms.

use crate::math::forward_gap;

/// The minimum gap to maintain between vehicles, `s0`, in m.
pub const MIN_GAP: f64 = 2.0; // m

/// Floor applied to desired speeds before dividing.
const EPS_SPEED: f64 = 1e-6; // m/s

/// Floor applied to gaps before dividing.
const EPS_GAP: f64 = 1e-3; // m

/// Computes a car-following acceleration using the intelligent driver model.
///
/// # Arguments
/// * `v` - The follower's speed (m/s).
/// * `v_leader` - The leader's speed (m/s).
/// * `gap` - Net bumper-to-bumper gap to the leader (m).
/// * `v0` - The follower's desired speed (m/s).
/// * `headway` - The follower's desired time headway `T` (s).
/// * `comfort_brake` - The follower's comfortable deceleration (m/s^2, positive).
/// * `a_max` - Maximum acceleration (m/s^2).
/// * `delta` - Free-speed exponent.
pub fn idm_accel(
    v: f64,
    v_leader: f64,
    gap: f64,
    v0: f64,
    headway: f64,
    comfort_brake: f64,
    a_max: f64,
    delta: f64,
) -> f64 {
    let v0 = v0.max(EPS_SPEED);
    let gap = gap.max(EPS_GAP);
    let appr = v - v_leader;
    let s_star = MIN_GAP + v * headway + v * appr / (2.0 * (a_max * comfort_brake).sqrt());
    let term = s_star / gap;
    a_max * (1.0 - (v / v0).powf(delta) - term * term)
}

/// Net gap from vehicle `i` to its ring leader `j`, in m.
///
/// A vehicle that is its own leader (single-vehicle ring) sees the whole
/// track ahead of itself.
pub fn ring_gap(i: usize, j: usize, s: &[f64], half_len: &[f64], track_len: f64) -> f64 {
    if i == j {
        return track_len - 2.0 * half_len[i];
    }
    forward_gap(s[i], s[j], track_len) - half_len[i] - half_len[j]
}

/// Batch IDM over parallel arrays, one entry per vehicle.
///
/// `leader` holds each follower's leader index (ring fallback rule:
/// `leader[i] == i` means a free ring). Numerically equivalent to calling
/// [idm_accel] per vehicle.
#[allow(clippy::too_many_arguments)]
pub fn idm_accel_batch(
    out: &mut [f64],
    s: &[f64],
    v: &[f64],
    half_len: &[f64],
    leader: &[usize],
    v0: &[f64],
    headway: &[f64],
    comfort_brake: &[f64],
    a_max: f64,
    delta: f64,
    track_len: f64,
) {
    for i in 0..out.len() {
        let j = leader[i];
        let gap = ring_gap(i, j, s, half_len, track_len);
        out[i] = idm_accel(
            v[i],
            v[j],
            gap,
            v0[i],
            headway[i],
            comfort_brake[i],
            a_max,
            delta,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn brakes_when_closing_on_a_slow_leader() {
        let a = idm_accel(10.0, 0.5, 2.0, 30.0, 1.5, 2.5, 1.8, 4.0);
        assert!(a < 0.0, "expected braking, got {}", a);
    }

    #[test]
    fn accelerates_on_a_free_road() {
        let a = idm_accel(5.0, 30.0, 500.0, 30.0, 1.5, 2.5, 1.8, 4.0);
        assert!(a > 0.0);
        assert!(a < 1.8);
    }

    #[test]
    fn eases_off_near_desired_speed() {
        let a = idm_accel(30.0, 30.0, 500.0, 30.0, 1.5, 2.5, 1.8, 4.0);
        assert_approx_eq!(a, 0.0, 0.05);
    }

    #[test]
    fn zero_gap_and_zero_desired_speed_stay_finite() {
        let a = idm_accel(10.0, 0.0, 0.0, 30.0, 1.5, 2.5, 1.8, 4.0);
        assert!(a.is_finite());
        assert!(a < 0.0);
        let a = idm_accel(10.0, 10.0, 50.0, 0.0, 1.5, 2.5, 1.8, 4.0);
        assert!(a.is_finite());
    }

    #[test]
    fn own_leader_sees_the_whole_ring() {
        let s = [100.0];
        let half_len = [2.3];
        let gap = ring_gap(0, 0, &s, &half_len, 1000.0);
        assert_approx_eq!(gap, 1000.0 - 4.6, 1e-9);
    }

    #[test]
    fn batch_matches_scalar_loop() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(21);
        let n = 64;
        let track_len = 2000.0;
        let s: Vec<f64> = (0..n)
            .map(|_| rng.gen_range(0.0..track_len))
            .collect();
        let v: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..35.0)).collect();
        let half_len: Vec<f64> = (0..n).map(|_| rng.gen_range(1.8..6.0)).collect();
        let v0: Vec<f64> = (0..n).map(|_| rng.gen_range(20.0..40.0)).collect();
        let headway: Vec<f64> = (0..n).map(|_| rng.gen_range(0.8..2.5)).collect();
        let brake: Vec<f64> = (0..n).map(|_| rng.gen_range(1.5..4.0)).collect();
        // Ring fallback: leader is the next index mod n
        let leader: Vec<usize> = (0..n).map(|i| (i + 1) % n).collect();

        let mut batch = vec![0.0; n];
        idm_accel_batch(
            &mut batch, &s, &v, &half_len, &leader, &v0, &headway, &brake, 1.8, 4.0, track_len,
        );

        for i in 0..n {
            let gap = ring_gap(i, leader[i], &s, &half_len, track_len);
            let scalar = idm_accel(
                v[i], v[leader[i]], gap, v0[i], headway[i], brake[i], 1.8, 4.0,
            );
            assert_approx_eq!(batch[i], scalar, 1e-12);
        }
    }
}
