//! Geometry helpers for the movement solver.
//!
//! Pure functions over `Vec3`/`Quat`. Everything here is tolerant of
//! degenerate input (zero-length vectors, coincident planes) and returns a
//! neutral value instead of NaN.

use bevy::prelude::*;

/// Tolerance used for plane-violation and parallelism tests throughout the
/// solver. Dot products within this band are treated as "on the plane".
pub const EPSILON: f32 = 1e-4;

/// Squared-length threshold below which a vector counts as zero.
pub const SQUARED_EPSILON: f32 = EPSILON * EPSILON;

/// Project a vector onto the plane with the given unit normal.
#[inline]
pub fn project_on_plane(vector: Vec3, plane_normal: Vec3) -> Vec3 {
    vector - plane_normal * vector.dot(plane_normal)
}

/// Remove only the component of `vector` that enters the plane.
///
/// Unlike [`project_on_plane`], a vector already leaving the plane is
/// returned unchanged.
#[inline]
pub fn clip_to_plane(vector: Vec3, plane_normal: Vec3) -> Vec3 {
    vector - plane_normal * vector.dot(plane_normal).min(0.0)
}

/// Reorient `vector` so it lies on the plane while keeping its magnitude,
/// staying in the vertical slice spanned by the vector and `up`.
///
/// This is the grounded-movement projection: a horizontal stride reoriented
/// onto a slope keeps its speed instead of losing the uphill component.
/// Falls back to a plain plane projection when the input is parallel to `up`
/// or the plane is perpendicular to the slice.
pub fn reorient_on_plane(vector: Vec3, plane_normal: Vec3, up: Vec3) -> Vec3 {
    let length = vector.length();
    if length <= EPSILON {
        return Vec3::ZERO;
    }
    let side_axis = up.cross(vector / length);
    if side_axis.length_squared() <= SQUARED_EPSILON {
        return project_on_plane(vector, plane_normal);
    }
    let on_plane_direction = side_axis.cross(plane_normal).normalize_or_zero();
    if on_plane_direction == Vec3::ZERO {
        return project_on_plane(vector, plane_normal);
    }
    on_plane_direction * length
}

/// Convert a sharpness tuning value into a frame interpolant in `[0, 1]`.
///
/// Sharpness is frame-rate independent: the same value converges at the same
/// real-time rate regardless of `delta_time`. Zero or negative sharpness
/// yields zero (no movement toward the target); very large sharpness
/// saturates at one.
#[inline]
pub fn interpolant_from_sharpness(sharpness: f32, delta_time: f32) -> f32 {
    if sharpness <= 0.0 || delta_time <= 0.0 {
        return 0.0;
    }
    1.0 - (-sharpness * delta_time).exp()
}

/// Move `current` toward `target` by at most `max_delta`.
pub fn move_toward(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let to_target = target - current;
    let distance = to_target.length();
    if distance <= max_delta || distance <= EPSILON {
        return target;
    }
    current + to_target / distance * max_delta
}

/// Pick the representation of `to` on the same hemisphere as `from`, so that
/// a slerp between them takes the shortest arc.
#[inline]
pub fn shortest_rotation(from: Quat, to: Quat) -> Quat {
    if from.dot(to) < 0.0 {
        -to
    } else {
        to
    }
}

/// Slerp with shortest-arc selection and a sharpness-derived interpolant.
pub fn smooth_rotate(current: Quat, target: Quat, sharpness: f32, delta_time: f32) -> Quat {
    let target = shortest_rotation(current, target);
    current
        .slerp(target, interpolant_from_sharpness(sharpness, delta_time))
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn project_on_plane_removes_normal_component() {
        let projected = project_on_plane(Vec3::new(1.0, 1.0, 0.0), Vec3::Y);
        assert_relative_eq!(projected.x, 1.0);
        assert_relative_eq!(projected.y, 0.0);
    }

    #[test]
    fn clip_to_plane_keeps_separating_velocity() {
        let leaving = Vec3::new(1.0, 2.0, 0.0);
        assert_eq!(clip_to_plane(leaving, Vec3::Y), leaving);

        let entering = Vec3::new(1.0, -2.0, 0.0);
        let clipped = clip_to_plane(entering, Vec3::Y);
        assert_relative_eq!(clipped.y, 0.0);
        assert_relative_eq!(clipped.x, 1.0);
    }

    #[test]
    fn reorient_keeps_magnitude_on_slope() {
        let angle = 30.0_f32.to_radians();
        let slope_normal = Vec3::new(-angle.sin(), angle.cos(), 0.0);
        let reoriented = reorient_on_plane(Vec3::new(2.0, 0.0, 0.0), slope_normal, Vec3::Y);

        assert_relative_eq!(reoriented.length(), 2.0, epsilon = 1e-5);
        assert_relative_eq!(reoriented.dot(slope_normal), 0.0, epsilon = 1e-5);
        // Still travels in the +X half-space.
        assert!(reoriented.x > 0.0);
    }

    #[test]
    fn reorient_is_identity_on_conformant_vector() {
        let v = Vec3::new(3.0, 0.0, 1.0);
        let reoriented = reorient_on_plane(v, Vec3::Y, Vec3::Y);
        assert_relative_eq!(reoriented.x, v.x, epsilon = 1e-5);
        assert_relative_eq!(reoriented.y, v.y, epsilon = 1e-5);
        assert_relative_eq!(reoriented.z, v.z, epsilon = 1e-5);
    }

    #[test]
    fn reorient_degenerates_to_projection_when_parallel_to_up() {
        let falling = Vec3::new(0.0, -5.0, 0.0);
        assert_eq!(reorient_on_plane(falling, Vec3::Y, Vec3::Y), Vec3::ZERO);
    }

    #[test]
    fn interpolant_saturates() {
        assert_eq!(interpolant_from_sharpness(0.0, 0.02), 0.0);
        assert_eq!(interpolant_from_sharpness(10.0, 0.0), 0.0);
        let t = interpolant_from_sharpness(1000.0, 1.0);
        assert!(t > 0.999 && t <= 1.0);
    }

    #[test]
    fn interpolant_is_framerate_independent() {
        // Two half-steps converge exactly as far as one full step.
        let one = 1.0 - interpolant_from_sharpness(4.0, 0.02);
        let half = 1.0 - interpolant_from_sharpness(4.0, 0.01);
        assert_relative_eq!(one, half * half, epsilon = 1e-6);
    }

    #[test]
    fn move_toward_clamps_step() {
        let stepped = move_toward(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 1.0);
        assert_relative_eq!(stepped.x, 1.0);

        let arrived = move_toward(Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), 1.0);
        assert_relative_eq!(arrived.x, 0.5);
    }

    #[test]
    fn shortest_rotation_flips_antipodal_target() {
        let from = Quat::IDENTITY;
        let target = -Quat::from_rotation_y(0.1);
        let chosen = shortest_rotation(from, target);
        assert!(from.dot(chosen) >= 0.0);
    }
}
