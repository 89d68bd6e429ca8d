//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Wraps an arc-length coordinate onto `[0, length)`.
pub fn wrap_pos(s: f64, length: f64) -> f64 {
    let s = s.rem_euclid(length);
    // rem_euclid can return exactly `length` when `s` is a tiny negative number
    if s >= length {
        0.0
    } else {
        s
    }
}

/// Forward (downstream) arc distance from `from` to `to` on a ring of the
/// given length. Always in `[0, length)`.
pub fn forward_gap(from: f64, to: f64, length: f64) -> f64 {
    wrap_pos(to - from, length)
}

/// Shortest separation between two arc positions, in `[0, length/2]`.
pub fn ring_separation(a: f64, b: f64, length: f64) -> f64 {
    let d = forward_gap(a, b, length);
    d.min(length - d)
}

/// Whether `x` lies strictly between `from` and `to` travelling downstream.
pub fn is_between(from: f64, to: f64, x: f64, length: f64) -> bool {
    let span = forward_gap(from, to, length);
    let d = forward_gap(from, x, length);
    d > 0.0 && d < span
}

/// The logistic sigmoid.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn wrapping() {
        assert_approx_eq!(wrap_pos(1050.0, 1000.0), 50.0);
        assert_approx_eq!(wrap_pos(-10.0, 1000.0), 990.0);
        assert_approx_eq!(wrap_pos(0.0, 1000.0), 0.0);
        assert!(wrap_pos(-1e-18, 1000.0) < 1000.0);
    }

    #[test]
    fn gaps() {
        assert_approx_eq!(forward_gap(990.0, 10.0, 1000.0), 20.0);
        assert_approx_eq!(forward_gap(10.0, 990.0, 1000.0), 980.0);
        assert_approx_eq!(ring_separation(10.0, 990.0, 1000.0), 20.0);
    }

    #[test]
    fn betweenness() {
        assert!(is_between(990.0, 30.0, 10.0, 1000.0));
        assert!(!is_between(990.0, 30.0, 50.0, 1000.0));
        assert!(!is_between(990.0, 30.0, 990.0, 1000.0));
        assert!(!is_between(990.0, 30.0, 30.0, 1000.0));
    }
}
