//! Planar geometry helpers shared by physics, AI and lap tracking
//!
//! All positions live on the x/z ground plane. Headings are radians measured
//! from +x toward +z.

use std::f32::consts::{PI, TAU};

/// Distances below this are treated as "the same point"
pub const EPSILON_DISTANCE: f32 = 1.0e-4;

/// Wrap an angle into (-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Unit vector for a heading
pub fn heading_vector(angle: f32) -> (f32, f32) {
    (angle.cos(), angle.sin())
}

pub fn distance(ax: f32, az: f32, bx: f32, bz: f32) -> f32 {
    let dx = bx - ax;
    let dz = bz - az;
    (dx * dx + dz * dz).sqrt()
}

/// Heading from one point to another, or `None` when they coincide
pub fn bearing(from_x: f32, from_z: f32, to_x: f32, to_z: f32) -> Option<f32> {
    let dx = to_x - from_x;
    let dz = to_z - from_z;
    if dx.abs() < EPSILON_DISTANCE && dz.abs() < EPSILON_DISTANCE {
        return None;
    }
    Some(dz.atan2(dx))
}

/// Move `current` toward `target` by at most `max_step`
pub fn approach(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = target - current;
    let step = delta.clamp(-max_step.abs(), max_step.abs());
    current + step
}

/// Unit vector to the right of a heading. Positive steering turns toward it.
pub fn right_vector(angle: f32) -> (f32, f32) {
    (-angle.sin(), angle.cos())
}

/// Split a relative offset into (longitudinal, lateral) components for a heading.
/// Positive lateral is to the right of travel.
pub fn to_local(dx: f32, dz: f32, heading: f32) -> (f32, f32) {
    let (fx, fz) = heading_vector(heading);
    let (rx, rz) = right_vector(heading);
    (dx * fx + dz * fz, dx * rx + dz * rz)
}

/// Time and separation of closest approach for a relative position and velocity.
/// Time is clamped to `[0, horizon]`.
pub fn closest_approach(
    rel_x: f32,
    rel_z: f32,
    rel_vx: f32,
    rel_vz: f32,
    horizon: f32,
) -> (f32, f32) {
    let speed_sq = rel_vx * rel_vx + rel_vz * rel_vz;
    let t = if speed_sq < EPSILON_DISTANCE {
        0.0
    } else {
        (-(rel_x * rel_vx + rel_z * rel_vz) / speed_sq).clamp(0.0, horizon.max(0.0))
    };
    let cx = rel_x + rel_vx * t;
    let cz = rel_z + rel_vz * t;
    (t, (cx * cx + cz * cz).sqrt())
}

/// Distance from a point to the segment `a`-`b`
pub fn distance_to_segment(px: f32, pz: f32, ax: f32, az: f32, bx: f32, bz: f32) -> f32 {
    let abx = bx - ax;
    let abz = bz - az;
    let len_sq = abx * abx + abz * abz;
    if len_sq < EPSILON_DISTANCE {
        return distance(px, pz, ax, az);
    }
    let t = (((px - ax) * abx + (pz - az) * abz) / len_sq).clamp(0.0, 1.0);
    distance(px, pz, ax + abx * t, az + abz * t)
}
