//! Closed stadium track geometry.
//!
//! The centreline is two straights joined by two semicircular arcs, so the
//! total length satisfies `L = 2*pi*R + 2*S`. Longitudinal positions are
//! arc-length coordinates wrapping modulo `L`.

use crate::config::{ConfigError, TrackConfig};
use crate::math::{wrap_pos, Point2d};
use std::f64::consts::PI;

/// Constant of the safe-curve relation `V^2 = 127 * R * (e + f)`,
/// with V in km/h and R in m.
const SAFE_CURVE_K: f64 = 127.0;

/// An immutable closed-loop stadium track.
#[derive(Clone, Debug)]
pub struct Track {
    /// Total centreline length in m.
    length_m: f64,
    /// Fraction of the length made up by the two straights.
    straight_fraction: f64,
    /// Radius of the two semicircular curves in m.
    radius_m: f64,
    /// Length of each straight in m.
    straight_length_m: f64,
}

impl Track {
    /// Creates a track from its config, validating the geometry.
    pub fn new(config: &TrackConfig) -> Result<Self, ConfigError> {
        if !(config.length_m.is_finite() && config.length_m > 0.0) {
            return Err(ConfigError::Track(format!(
                "length_m must be positive, got {}",
                config.length_m
            )));
        }
        if !(0.0..1.0).contains(&config.straight_fraction) {
            return Err(ConfigError::Track(format!(
                "straight_fraction must be in [0, 1), got {}",
                config.straight_fraction
            )));
        }
        let length_m = config.length_m;
        let straight_fraction = config.straight_fraction;
        let straight_length_m = 0.5 * straight_fraction * length_m;
        let radius_m = (1.0 - straight_fraction) * length_m / (2.0 * PI);
        Ok(Self {
            length_m,
            straight_fraction,
            radius_m,
            straight_length_m,
        })
    }

    /// The total centreline length in m.
    pub fn length(&self) -> f64 {
        self.length_m
    }

    /// The curve radius in m.
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// The length of each straight in m.
    pub fn straight_length_m(&self) -> f64 {
        self.straight_length_m
    }

    /// Maps an arc-length coordinate to world position and heading.
    ///
    /// The mapping is continuous and periodic modulo the track length.
    /// `s = 0` is the start of the bottom straight, heading `+x`.
    pub fn position_heading(&self, s: f64) -> (Point2d, f64) {
        let s = wrap_pos(s, self.length_m);
        let straight = self.straight_length_m;
        let arc = PI * self.radius_m;
        let half = 0.5 * straight;

        if s < straight {
            // Bottom straight, left to right
            (Point2d::new(s - half, -self.radius_m), 0.0)
        } else if s < straight + arc {
            // Right curve, sweeping counterclockwise
            let phi = -0.5 * PI + (s - straight) / self.radius_m;
            let pos = Point2d::new(
                half + self.radius_m * phi.cos(),
                self.radius_m * phi.sin(),
            );
            (pos, phi + 0.5 * PI)
        } else if s < 2.0 * straight + arc {
            // Top straight, right to left
            let u = s - straight - arc;
            (Point2d::new(half - u, self.radius_m), PI)
        } else {
            // Left curve
            let phi = 0.5 * PI + (s - 2.0 * straight - arc) / self.radius_m;
            let pos = Point2d::new(
                -half + self.radius_m * phi.cos(),
                self.radius_m * phi.sin(),
            );
            (pos, phi + 0.5 * PI)
        }
    }

    /// The minimum curve radius that safely supports the given speed,
    /// from `V^2 = 127 * R * (e + f)`.
    pub fn safe_radius_min_m(v_kmh: f64, e: f64, f: f64) -> f64 {
        v_kmh * v_kmh / (SAFE_CURVE_K * (e + f).max(1e-9))
    }

    /// The maximum safe speed through this track's curves, in km/h.
    pub fn safe_speed_kmh(&self, e: f64, f: f64) -> f64 {
        (SAFE_CURVE_K * self.radius_m * (e + f).max(0.0)).sqrt()
    }

    /// The total track length that would give the requested curve radius
    /// at this track's straight fraction.
    pub fn needed_length_for_radius_m(&self, radius_m: f64) -> f64 {
        2.0 * PI * radius_m / (1.0 - self.straight_fraction)
    }
}
