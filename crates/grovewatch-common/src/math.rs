//! Horizontal-plane helpers over `glam::Vec3`.
//!
//! The world is Y-up. Combat ranges ignore height, so most distance checks
//! project both points onto the XZ plane first.

use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Projects a world position onto the horizontal (XZ) plane.
#[must_use]
pub fn flatten(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

/// Euclidean distance between two points, ignoring height.
#[must_use]
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    flatten(a).distance(flatten(b))
}

/// Unit direction from `from` to `to` in the horizontal plane.
///
/// Returns `None` when the points coincide horizontally.
#[must_use]
pub fn horizontal_direction(from: Vec3, to: Vec3) -> Option<Vec3> {
    let delta = flatten(to) - flatten(from);
    delta
        .try_normalize()
        .map(|dir| Vec3::new(dir.x, 0.0, dir.y))
}

/// Yaw (radians, 0 = +Z, positive towards +X) that faces `to` from `from`.
#[must_use]
pub fn yaw_towards(from: Vec3, to: Vec3) -> Option<f32> {
    horizontal_direction(from, to).map(|dir| dir.x.atan2(dir.z))
}

/// Wraps an angle into `(-PI, PI]`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Turns `current` towards `target` along the shortest arc by at most `max_step` radians.
#[must_use]
pub fn rotate_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = wrap_angle(target - current);
    let step = max_step.max(0.0);
    if delta.abs() <= step {
        wrap_angle(target)
    } else {
        wrap_angle(current + step * delta.signum())
    }
}

/// Shortest distance from `point` to the segment `a..b` in 3D.
#[must_use]
pub fn distance_to_segment(point: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

/// Returns true if the segment `a..b` passes through the sphere at `center`.
#[must_use]
pub fn segment_intersects_sphere(a: Vec3, b: Vec3, center: Vec3, radius: f32) -> bool {
    distance_to_segment(center, a, b) <= radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 50.0, 4.0);
        assert!((horizontal_distance(a, b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_towards_axes() {
        let origin = Vec3::ZERO;
        let yaw = yaw_towards(origin, Vec3::new(0.0, 0.0, 1.0)).expect("distinct points");
        assert!(yaw.abs() < 1e-5);
        let yaw = yaw_towards(origin, Vec3::new(1.0, 0.0, 0.0)).expect("distinct points");
        assert!((yaw - PI / 2.0).abs() < 1e-5);
        assert!(yaw_towards(origin, Vec3::new(0.0, 2.0, 0.0)).is_none());
    }

    #[test]
    fn test_rotate_towards_takes_shortest_arc() {
        // From just below +PI to just above -PI is a short hop across the seam.
        let result = rotate_towards(3.0, -3.0, 0.1);
        assert!(result > 3.0 || result < -3.0);
    }

    #[test]
    fn test_rotate_towards_snaps_within_step() {
        let result = rotate_towards(0.0, 0.05, 0.1);
        assert!((result - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_segment_sphere() {
        let a = Vec3::new(-5.0, 0.0, 0.0);
        let b = Vec3::new(5.0, 0.0, 0.0);
        assert!(segment_intersects_sphere(a, b, Vec3::new(0.0, 0.0, 0.5), 1.0));
        assert!(!segment_intersects_sphere(a, b, Vec3::new(0.0, 0.0, 2.0), 1.0));
        assert!(!segment_intersects_sphere(a, b, Vec3::new(8.0, 0.0, 0.0), 1.0));
    }

    proptest! {
        #[test]
        fn prop_wrap_angle_in_range(angle in -100.0f32..100.0) {
            let wrapped = wrap_angle(angle);
            prop_assert!(wrapped > -PI - 1e-4 && wrapped <= PI + 1e-4);
        }

        #[test]
        fn prop_rotate_towards_bounded_step(current in -PI..PI, target in -PI..PI, step in 0.0f32..1.0) {
            let next = rotate_towards(current, target, step);
            prop_assert!(wrap_angle(next - current).abs() <= step + 1e-4);
        }
    }
}
