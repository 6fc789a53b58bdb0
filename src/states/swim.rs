//! Swimming.

use bevy::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter};
use crate::config::Stance;
use crate::math;
use crate::solver::{self, CharacterContext};
use crate::states::{self, LocomotionState, StateTag};

/// Whether the character's immersion probe point is inside a water volume.
///
/// The probe point sits at a configurable fraction of the capsule height so
/// the character starts swimming when deep enough, not at the first splash.
pub fn is_in_water<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) -> bool {
    if ctx.config.water_tags == 0 {
        return false;
    }
    let capsule = ctx.capsule();
    let probe_point = ctx.position + ctx.up() * (capsule.height * ctx.config.swim_probe_ratio);
    let filter = CollisionFilter::tagged_volumes(ctx.entity, ctx.config.water_tags);
    B::point_distance(world, probe_point, capsule.height, &filter)
        .is_some_and(|projection| projection.is_inside)
}

pub fn physics_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    should_exit: &mut bool,
) {
    solver::first_phase_update::<B>(world, ctx);

    let in_water = is_in_water::<B>(world, ctx);
    *should_exit = !in_water;

    shape_velocity(ctx, in_water);
    solver::second_phase_update::<B>(world, ctx);
}

fn shape_velocity(ctx: &mut CharacterContext, in_water: bool) {
    let up = ctx.body.grounding_up;
    let dt = ctx.dt;
    let move_vector = states::free_move_vector(&ctx.input, up);

    let target = move_vector * ctx.config.swim_speed;
    ctx.body.relative_velocity = math::move_toward(
        ctx.body.relative_velocity,
        target,
        ctx.config.swim_acceleration * dt,
    );
    // Water drag acts on everything, including residual fall speed from the
    // plunge.
    ctx.body.relative_velocity *=
        1.0 - math::interpolant_from_sharpness(ctx.config.swim_drag_sharpness, dt);

    if !in_water {
        // Above the surface; fall back in or out.
        ctx.body.relative_velocity += ctx.config.gravity * dt;
    }
}

pub fn detect_transitions<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    should_exit: bool,
) -> Option<LocomotionState> {
    if let Some(next) = states::global_transition::<B>(world, ctx, StateTag::Swimming) {
        return Some(next);
    }
    if ctx.body.is_grounded {
        return Some(LocomotionState::GroundMove);
    }
    if should_exit {
        return Some(LocomotionState::AirMove);
    }
    None
}

pub(crate) fn on_enter(ctx: &mut CharacterContext) {
    ctx.body.stance = Stance::Swimming;
    ctx.body.snapping_suppressed = true;
}

pub(crate) fn on_exit(ctx: &mut CharacterContext) {
    // Restore the ground-snap flag and collider geometry; the destination's
    // enter may set its own.
    ctx.body.snapping_suppressed = false;
    ctx.body.stance = Stance::Standing;
}
