//! Ground movement, standing and crouched.

use bevy::prelude::*;

use crate::backend::CollisionBackend;
use crate::collision::CollisionResponse;
use crate::math;
use crate::solver::{self, CharacterContext};
use crate::states::{self, LocomotionState, StateTag};

pub fn physics_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    crouching: bool,
) {
    solver::first_phase_update::<B>(world, ctx);
    shape_velocity(ctx, crouching);
    solver::second_phase_update::<B>(world, ctx);
}

fn shape_velocity(ctx: &mut CharacterContext, crouching: bool) {
    let up = ctx.body.grounding_up;
    let dt = ctx.dt;
    let move_vector = states::planar_move_vector(&ctx.input, up);

    if ctx.body.is_grounded {
        let target_speed = if crouching {
            ctx.config.crouch_speed
        } else if ctx.input.sprint_held {
            ctx.config.sprint_speed
        } else {
            ctx.config.ground_speed
        };

        // Move along the ground plane: the target is reoriented onto the
        // slope so uphill strides keep their speed.
        let target = math::reorient_on_plane(
            move_vector * target_speed,
            ctx.body.ground_normal(),
            up,
        );
        ctx.body.relative_velocity = math::move_toward(
            ctx.body.relative_velocity,
            target,
            ctx.config.ground_acceleration * dt,
        );
        if !ctx.input.is_moving() {
            let damping =
                1.0 - math::interpolant_from_sharpness(ctx.config.ground_friction_sharpness, dt);
            ctx.body.relative_velocity *= damping;
        }

        if !crouching && ctx.body.jump_buffer > 0.0 {
            jump(ctx);
        }
    } else {
        // Briefly airborne inside a ground state; transition detection will
        // hand over to AirMove after this update.
        ctx.body.relative_velocity += ctx.config.gravity * dt;
    }
}

/// Launch off the ground along the grounding up axis.
pub(crate) fn jump(ctx: &mut CharacterContext) {
    let up = ctx.body.grounding_up;
    let lateral = math::project_on_plane(ctx.body.relative_velocity, up);
    ctx.body.relative_velocity = lateral + up * ctx.config.jump_speed;
    ctx.body.jump_buffer = 0.0;
    ctx.body.unground();
}

pub fn detect_transitions<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    crouching: bool,
) -> Option<LocomotionState> {
    let tag = if crouching {
        StateTag::Crouched
    } else {
        StateTag::GroundMove
    };
    if let Some(next) = states::global_transition::<B>(world, ctx, tag) {
        return Some(next);
    }
    if crate::states::swim::is_in_water::<B>(world, ctx) {
        return Some(LocomotionState::Swimming { should_exit: false });
    }

    if crouching {
        if !ctx.input.crouch_held && has_room_to_stand::<B>(world, ctx) {
            return Some(if ctx.body.is_grounded {
                LocomotionState::GroundMove
            } else {
                LocomotionState::AirMove
            });
        }
        if !ctx.body.is_grounded {
            return Some(LocomotionState::AirMove);
        }
    } else {
        if !ctx.body.is_grounded {
            return Some(LocomotionState::AirMove);
        }
        if ctx.input.crouch_pressed || ctx.input.crouch_held {
            return Some(LocomotionState::Crouched);
        }
    }
    None
}

/// Overlap test with the standing capsule: standing up is allowed only when
/// nothing solid occupies the space above the crouched capsule.
pub fn has_room_to_stand<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) -> bool {
    let standing = ctx.config.standing;
    let up = ctx.body.grounding_up;
    let center = ctx.position + up * standing.center_offset();
    let filter = ctx.solid_filter();
    let clearance_height = ctx.config.crouching.height * 0.75;

    B::calculate_distance(
        world,
        &standing,
        center,
        ctx.rotation,
        0.0,
        &filter,
        &mut ctx.buffers.probe_hits,
    );
    !ctx.buffers.probe_hits.iter().any(|hit| {
        hit.surface.response == CollisionResponse::Collide
            && (hit.position - ctx.position).dot(up) > clearance_height
    })
}

pub(crate) fn on_enter_default(ctx: &mut CharacterContext) {
    ctx.body.stance = crate::config::Stance::Standing;
}

pub(crate) fn on_enter_crouched(ctx: &mut CharacterContext) {
    ctx.body.stance = crate::config::Stance::Crouching;
}

pub(crate) fn on_exit_crouched(ctx: &mut CharacterContext) {
    // Revert the collider geometry; the destination's enter may set its own.
    ctx.body.stance = crate::config::Stance::Standing;
}
