//! God mode: free flight, no collisions.

use bevy::prelude::*;

use crate::math;
use crate::solver::{self, CharacterContext};
use crate::states::{self, LocomotionState};

pub fn physics_update(ctx: &mut CharacterContext) {
    solver::initialize_update(ctx);

    // No grounding, no parent, no collision queries.
    ctx.body.unground();
    ctx.body.parent = None;
    ctx.body.parent_velocity = Vec3::ZERO;

    let move_vector = states::free_move_vector(&ctx.input, ctx.body.grounding_up);
    let mut target = move_vector * ctx.config.god_speed;
    if ctx.input.sprint_held {
        target *= 2.0;
    }
    let interpolant = math::interpolant_from_sharpness(ctx.config.god_sharpness, ctx.dt);
    ctx.body.relative_velocity = ctx.body.relative_velocity.lerp(target, interpolant);
    ctx.position += ctx.body.relative_velocity * ctx.dt;

    // Flush exit events for contacts from before the mode switch.
    solver::process_stateful_hits_update(ctx);
}

pub fn detect_transitions(ctx: &mut CharacterContext) -> Option<LocomotionState> {
    if ctx.input.god_toggle_pressed {
        return Some(LocomotionState::AirMove);
    }
    None
}

pub(crate) fn on_enter(ctx: &mut CharacterContext, _previous: &LocomotionState) {
    ctx.body.unground();
    ctx.body.parent = None;
    ctx.body.parent_velocity = Vec3::ZERO;
}

pub(crate) fn on_exit(ctx: &mut CharacterContext, _next: &LocomotionState) {
    // Leave velocity as-is; AirMove will start applying gravity to it.
}
