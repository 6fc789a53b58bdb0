//! Airborne movement.

use bevy::prelude::*;

use crate::backend::CollisionBackend;
use crate::math;
use crate::solver::{self, CharacterContext};
use crate::states::{self, LocomotionState, StateTag};

pub fn physics_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    solver::first_phase_update::<B>(world, ctx);
    shape_velocity(ctx);
    solver::second_phase_update::<B>(world, ctx);
}

fn shape_velocity(ctx: &mut CharacterContext) {
    let up = ctx.body.grounding_up;
    let dt = ctx.dt;
    let move_vector = states::planar_move_vector(&ctx.input, up);

    // Air control acts only on the lateral component while there is input;
    // without input, momentum is kept and only drag bleeds it off. Gravity
    // owns the vertical component.
    let lateral = math::project_on_plane(ctx.body.relative_velocity, up);
    let vertical = ctx.body.relative_velocity - lateral;

    let mut new_lateral = if ctx.input.is_moving() {
        let target = move_vector * ctx.config.air_speed;
        math::move_toward(lateral, target, ctx.config.air_acceleration * dt)
    } else {
        lateral
    };
    new_lateral *= 1.0 - math::interpolant_from_sharpness(ctx.config.air_drag_sharpness, dt);

    ctx.body.relative_velocity = new_lateral + vertical + ctx.config.gravity * dt;

    // Coyote jump: a buffered press fired shortly after leaving the ground.
    if ctx.body.jump_buffer > 0.0 && ctx.body.time_since_grounded < ctx.config.coyote_time {
        super::ground::jump(ctx);
    }
}

pub fn detect_transitions<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
) -> Option<LocomotionState> {
    if let Some(next) = states::global_transition::<B>(world, ctx, StateTag::AirMove) {
        return Some(next);
    }
    if crate::states::swim::is_in_water::<B>(world, ctx) {
        return Some(LocomotionState::Swimming { should_exit: false });
    }
    if ctx.body.is_grounded {
        return Some(if ctx.input.crouch_held {
            LocomotionState::Crouched
        } else {
            LocomotionState::GroundMove
        });
    }
    None
}
