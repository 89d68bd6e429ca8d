//! Actuation shaping between commanded and realized acceleration.
//!
//! The driver model commands an acceleration; the drivetrain realizes it
//! through a hard jerk clamp followed by first-order throttle/brake lag
//! filters. This is distinct from driver reaction time.

/// Internal actuation state of one vehicle.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActuationState {
    /// Acceleration requested by the driver model, in m/s^2.
    commanded: f64,
    /// Jerk-limited acceleration, in m/s^2.
    actual: f64,
    /// Jerk realized on the last update, in m/s^3.
    jerk: f64,
    /// Output of the throttle lag filter, in m/s^2.
    throttle_filter: f64,
    /// Output of the brake lag filter, in m/s^2.
    brake_filter: f64,
}

impl ActuationState {
    /// Sets the commanded acceleration for the next update.
    pub fn set_commanded(&mut self, accel: f64) {
        self.commanded = accel;
    }

    /// The currently commanded acceleration in m/s^2.
    pub fn commanded(&self) -> f64 {
        self.commanded
    }

    /// The jerk realized on the last update, in m/s^3.
    pub fn jerk(&self) -> f64 {
        self.jerk
    }

    /// Advances the actuation model by `dt` and returns the externally
    /// visible acceleration (throttle + brake filter outputs).
    ///
    /// The realized jerk magnitude never exceeds `jerk_limit`.
    pub fn update(&mut self, dt: f64, jerk_limit: f64, throttle_lag: f64, brake_lag: f64) -> f64 {
        let max_change = jerk_limit * dt;
        let change = (self.commanded - self.actual).clamp(-max_change, max_change);
        self.actual += change;
        self.jerk = if dt > 0.0 { change / dt } else { 0.0 };

        let alpha_t = dt / (throttle_lag + dt);
        let alpha_b = dt / (brake_lag + dt);
        if self.actual > 0.0 {
            self.throttle_filter += alpha_t * (self.actual - self.throttle_filter);
            self.brake_filter += alpha_b * (0.0 - self.brake_filter);
        } else if self.actual < 0.0 {
            self.brake_filter += alpha_b * (self.actual - self.brake_filter);
            self.throttle_filter += alpha_t * (0.0 - self.throttle_filter);
        } else {
            self.throttle_filter += alpha_t * (0.0 - self.throttle_filter);
            self.brake_filter += alpha_b * (0.0 - self.brake_filter);
        }
        self.throttle_filter + self.brake_filter
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn jerk_never_exceeds_limit() {
        let mut act = ActuationState::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let dt = 0.02;
        let jerk_limit = 3.0;
        for _ in 0..2000 {
            act.set_commanded(rng.gen_range(-8.0..3.0));
            act.update(dt, jerk_limit, 0.25, 0.15);
            assert!(act.jerk().abs() <= jerk_limit + 1e-6);
        }
    }

    #[test]
    fn constant_command_converges() {
        let mut act = ActuationState::default();
        act.set_commanded(1.5);
        let mut out = 0.0;
        for _ in 0..1000 {
            out = act.update(0.02, 3.0, 0.25, 0.15);
        }
        assert_approx_eq!(out, 1.5, 1e-6);
    }

    #[test]
    fn brake_filter_takes_over_on_sign_flip() {
        let mut act = ActuationState::default();
        act.set_commanded(2.0);
        for _ in 0..500 {
            act.update(0.02, 5.0, 0.2, 0.1);
        }
        act.set_commanded(-3.0);
        let mut out = 0.0;
        for _ in 0..500 {
            out = act.update(0.02, 5.0, 0.2, 0.1);
        }
        assert_approx_eq!(out, -3.0, 1e-6);
        assert_approx_eq!(act.throttle_filter, 0.0, 1e-6);
    }

    #[test]
    fn ramp_is_limited_to_jerk_times_dt() {
        let mut act = ActuationState::default();
        act.set_commanded(10.0);
        act.update(0.1, 2.0, 1e-9, 1e-9);
        // One step can move the actual accel by at most 0.2 m/s^2
        assert_approx_eq!(act.actual, 0.2, 1e-9);
    }
}
