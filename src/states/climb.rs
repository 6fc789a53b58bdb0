//! Climbing.

use bevy::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter};
use crate::collision::CollisionResponse;
use crate::config::Stance;
use crate::input::MoveInput;
use crate::math;
use crate::solver::{self, CharacterContext};
use crate::states::LocomotionState;

/// Extra pull into the climbed surface, as a fraction of the climb speed,
/// keeping the grip cast in contact across surface irregularities.
const GRIP_PULL_FRACTION: f32 = 0.5;

/// Look for a climbable surface in front of the character.
pub fn find_climbable_surface<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
) -> Option<Vec3> {
    if ctx.config.climbable_tags == 0 {
        return None;
    }
    let facing = math::project_on_plane(ctx.rotation * Vec3::NEG_Z, ctx.body.grounding_up)
        .normalize_or_zero();
    if facing == Vec3::ZERO {
        return None;
    }
    grip_cast::<B>(world, ctx, facing)
}

/// Cast toward a direction and return the normal of the closest climbable
/// surface within grip reach.
fn grip_cast<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    direction: Vec3,
) -> Option<Vec3> {
    let capsule = ctx.capsule();
    let filter = CollisionFilter {
        exclude: Some(ctx.entity),
        groups: ctx.config.collision_groups,
        include_triggers: false,
        required_tags: ctx.config.climbable_tags,
    };
    B::cast_collider(
        world,
        &capsule,
        ctx.capsule_center(),
        ctx.rotation,
        direction,
        ctx.config.climb_grip_distance,
        &filter,
        &mut ctx.buffers.probe_hits,
    );
    ctx.buffers
        .probe_hits
        .iter()
        .find(|hit| hit.surface.response == CollisionResponse::Collide)
        .map(|hit| hit.normal)
}

pub fn physics_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    surface_normal: &mut Vec3,
) {
    solver::first_phase_update::<B>(world, ctx);
    // Climbing never counts as supported by the ground.
    ctx.body.unground();

    // Refresh the grip toward the last known surface.
    let toward = if surface_normal.length_squared() > math::SQUARED_EPSILON {
        -*surface_normal
    } else {
        ctx.rotation * Vec3::NEG_Z
    };
    match grip_cast::<B>(world, ctx, toward.normalize_or_zero()) {
        Some(normal) => *surface_normal = normal,
        None => *surface_normal = Vec3::ZERO,
    }

    if surface_normal.length_squared() > math::SQUARED_EPSILON {
        shape_velocity(ctx, *surface_normal);
    }

    solver::second_phase_update::<B>(world, ctx);
}

fn shape_velocity(ctx: &mut CharacterContext, surface_normal: Vec3) {
    let move_vector = surface_move_vector(&ctx.input, ctx.body.grounding_up, surface_normal);
    let target = move_vector * ctx.config.climb_speed
        - surface_normal * ctx.config.climb_speed * GRIP_PULL_FRACTION;
    let interpolant = math::interpolant_from_sharpness(ctx.config.climb_sharpness, ctx.dt);
    ctx.body.relative_velocity = ctx.body.relative_velocity.lerp(target, interpolant);
}

/// Map planar input onto the climbed surface: forward climbs up the wall,
/// strafe moves sideways along it.
pub fn surface_move_vector(input: &MoveInput, grounding_up: Vec3, surface_normal: Vec3) -> Vec3 {
    if surface_normal.length_squared() < math::SQUARED_EPSILON {
        return Vec3::ZERO;
    }
    let wall_up = math::project_on_plane(grounding_up, surface_normal).normalize_or_zero();
    if wall_up == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let wall_right = wall_up.cross(surface_normal).normalize_or_zero();
    (wall_right * input.move_axes.x + wall_up * input.move_axes.y).clamp_length_max(1.0)
}

pub fn detect_transitions(
    ctx: &mut CharacterContext,
    surface_normal: Vec3,
) -> Option<LocomotionState> {
    if ctx.input.god_toggle_pressed {
        return Some(LocomotionState::GodMode);
    }
    let lost_surface = surface_normal.length_squared() < math::SQUARED_EPSILON;
    if lost_surface || ctx.input.jump_pressed || ctx.input.climb_pressed {
        return Some(LocomotionState::AirMove);
    }
    None
}

pub(crate) fn on_enter(ctx: &mut CharacterContext, surface_normal: Vec3) {
    ctx.body.stance = Stance::Climbing;
    ctx.body.snapping_suppressed = true;
    ctx.body.unground();
    // Entering a climb sheds momentum not along the wall.
    ctx.body.relative_velocity = math::project_on_plane(ctx.body.relative_velocity, surface_normal);
}

pub(crate) fn on_exit(ctx: &mut CharacterContext) {
    ctx.body.snapping_suppressed = false;
    ctx.body.stance = Stance::Standing;
}
