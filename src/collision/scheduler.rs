//! Predicted-collision scheduling.
//!
//! Instead of re-scanning every pair each tick, each follower's current
//! ring leader gets a conservative earliest-collision time pushed onto a
//! min-heap. Entries carry a generation snapshot; when a follower's leader
//! changes its generation is bumped and stale heap entries are discarded
//! lazily on pop rather than searched for and removed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// One pending collision check.
#[derive(Clone, Copy, Debug)]
struct Scheduled {
    due_s: f64,
    generation: u64,
    follower: usize,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_s
            .total_cmp(&other.due_s)
            .then_with(|| self.follower.cmp(&other.follower))
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

/// Min-heap of predicted collision checks with lazy invalidation.
#[derive(Debug)]
pub(crate) struct CollisionScheduler {
    heap: BinaryHeap<Reverse<Scheduled>>,
    /// Each follower's current ring leader.
    leader_of: Vec<usize>,
    /// Monotonically increasing per-follower generation counter.
    generation: Vec<u64>,
    horizon_s: f64,
}

impl CollisionScheduler {
    pub fn new(n: usize, horizon_s: f64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            // Sentinel: forces a generation bump on the first adjacency pass
            leader_of: vec![usize::MAX; n],
            generation: vec![0; n],
            horizon_s,
        }
    }

    /// The follower's current leader index, if adjacency has been set.
    pub fn leader_of(&self, follower: usize) -> Option<usize> {
        let leader = self.leader_of[follower];
        (leader != usize::MAX).then_some(leader)
    }

    pub fn horizon_s(&self) -> f64 {
        self.horizon_s
    }

    /// Records the follower's current leader. On a change, bumps the
    /// generation (invalidating pending entries) and schedules a check at
    /// `now + eta`. Returns whether the mapping changed.
    pub fn set_adjacency(&mut self, follower: usize, leader: usize, now_s: f64, eta_s: f64) -> bool {
        if self.leader_of[follower] == leader {
            return false;
        }
        self.leader_of[follower] = leader;
        self.generation[follower] += 1;
        self.push(follower, now_s, eta_s);
        true
    }

    /// Schedules another check for a follower without changing adjacency.
    pub fn rearm(&mut self, follower: usize, now_s: f64, eta_s: f64) {
        self.push(follower, now_s, eta_s);
    }

    fn push(&mut self, follower: usize, now_s: f64, eta_s: f64) {
        let due_s = now_s + eta_s.clamp(0.0, self.horizon_s);
        self.heap.push(Reverse(Scheduled {
            due_s,
            generation: self.generation[follower],
            follower,
        }));
    }

    /// Pops every check due at or before `now`, discarding stale entries.
    pub fn due_followers(&mut self, now_s: f64) -> Vec<usize> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if entry.due_s > now_s {
                break;
            }
            self.heap.pop();
            if entry.generation == self.generation[entry.follower] {
                due.push(entry.follower);
            }
        }
        due
    }
}

/// Conservative earliest time until the gap closes to zero, in s.
///
/// Worst case: the follower holds its maximum acceleration while the
/// leader brakes at its maximum rate. Solves
/// `gap + (v_l - v_f) t + 0.5 (a_l - a_f) t^2 = 0` for the smallest
/// non-negative root, or returns the horizon when the gap never closes
/// within it.
pub(crate) fn predict_collision_time(
    gap_m: f64,
    v_follower: f64,
    v_leader: f64,
    follower_max_accel: f64,
    leader_max_brake: f64,
    horizon_s: f64,
) -> f64 {
    if gap_m <= 0.0 {
        return 0.0;
    }
    let c2 = 0.5 * (-leader_max_brake - follower_max_accel);
    let c1 = v_leader - v_follower;
    let c0 = gap_m;
    if c2.abs() < 1e-12 {
        // Constant relative speed
        if c1 < 0.0 {
            return (-c0 / c1).min(horizon_s);
        }
        return horizon_s;
    }
    let disc = c1 * c1 - 4.0 * c2 * c0;
    if disc < 0.0 {
        return horizon_s;
    }
    let sqrt_disc = disc.sqrt();
    let r1 = (-c1 + sqrt_disc) / (2.0 * c2);
    let r2 = (-c1 - sqrt_disc) / (2.0 * c2);
    let mut eta = horizon_s;
    for r in [r1, r2] {
        if r >= 0.0 && r < eta {
            eta = r;
        }
    }
    eta
}
