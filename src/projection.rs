//! Crease and corner aware velocity projection.
//!
//! Within a tick the solver accumulates every obstruction plane it touched.
//! After each new hit the velocity is re-projected against the whole set so
//! that the final velocity never re-enters any previously touched plane:
//! one plane slides, two non-coplanar planes slide along their crease, and a
//! third violated plane is a corner that stops movement entirely.
//!
//! The corner tie-break is a fixed policy: velocity is zeroed, no further
//! projection is attempted.

use bevy::prelude::*;

use crate::collision::{GroundHit, VelocityProjectionHit};
use crate::math::{self, EPSILON, SQUARED_EPSILON};

/// Upper bound on secondary-plane scans per projection call. Each scan
/// either leaves velocity stable, zeroes it, or constrains it against one
/// more plane, so real scenes settle in one or two passes.
const MAX_PROJECTION_PASSES: usize = 8;

enum ScanOutcome {
    Stable,
    Modified,
    Zeroed,
}

/// Re-project `velocity` against the tick's accumulated hit planes.
///
/// `hits` is ordered oldest to newest; the newest entry is the hit that
/// triggered this call. `original_direction` is the normalized direction the
/// character was moving in before any projection this tick; it acts as a
/// virtual plane so repeated projections never reverse the character into
/// where it came from. Grounding state is updated when a projection resolves
/// onto a grounded plane whose normal has a positive component along
/// `grounding_up`.
pub fn project_velocity_on_hits(
    velocity: &mut Vec3,
    is_grounded: &mut bool,
    ground_hit: &mut Option<GroundHit>,
    hits: &[VelocityProjectionHit],
    original_direction: Vec3,
    grounding_up: Vec3,
) {
    let Some(&first) = hits.last() else {
        return;
    };
    if velocity.length_squared() <= SQUARED_EPSILON {
        return;
    }
    // The newest plane is already satisfied; nothing to resolve.
    if velocity.dot(first.normal) > -EPSILON {
        return;
    }

    project_on_single_hit(velocity, is_grounded, ground_hit, &first, grounding_up);

    for _ in 0..MAX_PROJECTION_PASSES {
        if velocity.length_squared() <= SQUARED_EPSILON {
            *velocity = Vec3::ZERO;
            return;
        }
        match resolve_secondary_planes(velocity, *is_grounded, hits, original_direction) {
            ScanOutcome::Stable => return,
            ScanOutcome::Modified => {}
            ScanOutcome::Zeroed => {
                *velocity = Vec3::ZERO;
                return;
            }
        }
    }
    // The pass budget only runs out on pathological plane sets. Stopping is
    // the one resolution guaranteed not to re-enter any of them.
    *velocity = Vec3::ZERO;
}

/// Project against the newest hit using the rule selected by the
/// (currently grounded, grounded on hit) pair.
fn project_on_single_hit(
    velocity: &mut Vec3,
    is_grounded: &mut bool,
    ground_hit: &mut Option<GroundHit>,
    hit: &VelocityProjectionHit,
    grounding_up: Vec3,
) {
    if hit.grounded {
        if *is_grounded {
            // Grounded before and after: slide along the new ground plane
            // keeping speed, so slope changes do not bleed momentum.
            *velocity = math::reorient_on_plane(*velocity, hit.normal, grounding_up);
        } else {
            // Landing: drop the fall component, reorient what remains onto
            // the ground plane.
            let lateral = math::project_on_plane(*velocity, grounding_up);
            *velocity = math::reorient_on_plane(lateral, hit.normal, grounding_up);
        }
        if hit.normal.dot(grounding_up) > EPSILON {
            *is_grounded = true;
            *ground_hit = Some(hit.to_ground_hit());
        }
    } else if *is_grounded {
        // Grounded against an obstruction: constrain to the crease between
        // the ground plane and the obstruction so the character neither
        // climbs the obstruction nor digs into the ground.
        let ground_normal = ground_hit
            .as_ref()
            .map(|ground| ground.normal)
            .unwrap_or(grounding_up);
        let crease = ground_normal.cross(hit.normal).normalize_or_zero();
        if crease == Vec3::ZERO {
            *velocity = math::project_on_plane(*velocity, hit.normal);
        } else {
            *velocity = crease * velocity.dot(crease);
        }
    } else {
        *velocity = math::project_on_plane(*velocity, hit.normal);
    }
}

/// One scan over every older hit plus the virtual original-direction plane,
/// looking for planes the projected velocity still enters.
fn resolve_secondary_planes(
    velocity: &mut Vec3,
    is_grounded: bool,
    hits: &[VelocityProjectionHit],
    original_direction: Vec3,
) -> ScanOutcome {
    let newest = hits.len() - 1;
    let first = &hits[newest];

    for index in 0..=newest {
        // Slot zero is the virtual hit; real hits follow, oldest first,
        // excluding the newest which `project_on_single_hit` already
        // resolved.
        let (other_normal, other_grounded) = if index == 0 {
            if original_direction.length_squared() <= SQUARED_EPSILON {
                continue;
            }
            (original_direction, false)
        } else {
            let hit = &hits[index - 1];
            (hit.normal, hit.grounded)
        };

        if first.normal.dot(other_normal) > 1.0 - EPSILON {
            continue;
        }
        if velocity.dot(other_normal) >= -EPSILON {
            continue;
        }

        // Try satisfying the second plane alone.
        let candidate = math::project_on_plane(*velocity, other_normal);
        if candidate.dot(first.normal) >= -EPSILON {
            *velocity = candidate;
            return ScanOutcome::Modified;
        }

        // The two planes form a crease. Two obstruction planes while
        // grounded offer no direction that respects the ground too.
        if is_grounded && !first.grounded && !other_grounded {
            return ScanOutcome::Zeroed;
        }
        let crease = first.normal.cross(other_normal).normalize_or_zero();
        if crease == Vec3::ZERO {
            continue;
        }
        *velocity = crease * velocity.dot(crease);

        // Any further plane the crease direction enters is a corner.
        for third_index in 0..=newest {
            if third_index == index {
                continue;
            }
            let third_normal = if third_index == 0 {
                if original_direction.length_squared() <= SQUARED_EPSILON {
                    continue;
                }
                original_direction
            } else {
                hits[third_index - 1].normal
            };
            if third_normal.dot(first.normal) > 1.0 - EPSILON
                || third_normal.dot(other_normal) > 1.0 - EPSILON
            {
                continue;
            }
            if velocity.dot(third_normal) < -EPSILON {
                return ScanOutcome::Zeroed;
            }
        }
        return ScanOutcome::Modified;
    }

    if velocity.length_squared() <= SQUARED_EPSILON {
        return ScanOutcome::Zeroed;
    }
    ScanOutcome::Stable
}

/// Whether `velocity` respects every accumulated hit plane within `epsilon`.
pub fn velocity_satisfies_hits(
    velocity: Vec3,
    hits: &[VelocityProjectionHit],
    epsilon: f32,
) -> bool {
    hits.iter().all(|hit| velocity.dot(hit.normal) >= -epsilon)
}
