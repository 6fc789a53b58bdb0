//! Grounding evaluation.
//!
//! Decides, per hit, whether the character counts as supported by that
//! surface: a slope test against the configured walkable angle, a step
//! sub-probe for low obstructions, and a velocity veto that stops a
//! character leaping off a surface from being re-grounded by the very hit
//! it is separating from.

use bevy::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter};
use crate::collision::{CollisionResponse, QueryHit};
use crate::config::{CapsuleGeometry, CharacterConfig};
use crate::math;

/// Relative separation speed above which a hit cannot ground the character.
const GROUNDING_VETO_SPEED: f32 = 0.01;

/// Everything the evaluator needs about the character being tested.
#[derive(Debug, Clone, Copy)]
pub struct GroundingContext<'a> {
    pub config: &'a CharacterConfig,
    pub capsule: CapsuleGeometry,
    /// Capsule center, world space.
    pub center: Vec3,
    pub rotation: Quat,
    /// Feet anchor, world space.
    pub feet: Vec3,
    pub grounding_up: Vec3,
    /// World-space character velocity (relative plus parent).
    pub world_velocity: Vec3,
    pub filter: CollisionFilter,
}

/// Slope test: walkable when the surface normal is within the configured
/// angle of the grounding up direction.
#[inline]
pub fn passes_slope_test(config: &CharacterConfig, normal: Vec3, grounding_up: Vec3) -> bool {
    normal.dot(grounding_up) >= config.min_ground_dot()
}

/// Velocity veto: grounding is suppressed while the character separates
/// from the surface faster than the surface itself moves.
#[inline]
pub fn velocity_allows_grounding(
    world_velocity: Vec3,
    surface_velocity: Vec3,
    hit_normal: Vec3,
) -> bool {
    (world_velocity - surface_velocity).dot(hit_normal) <= GROUNDING_VETO_SPEED
}

/// Whether a contact lies low enough on the capsule to be step-tested.
#[inline]
pub fn is_underside_contact(
    hit_position: Vec3,
    feet: Vec3,
    grounding_up: Vec3,
    config: &CharacterConfig,
) -> bool {
    (hit_position - feet).dot(grounding_up) <= config.max_step_height + config.collision_margin
}

/// Full grounding decision for one hit.
///
/// Grounded when the slope test passes, or when the hit is a low static
/// obstruction whose step probe finds a walkable surface on top. Dynamic
/// bodies never ground through the step path, so the character cannot
/// "stand" on the rim of a rolling object.
pub fn is_grounded_on_hit<B: CollisionBackend>(
    world: &mut World,
    ctx: &GroundingContext,
    hit: &QueryHit,
    allow_step_probe: bool,
    probe_buffer: &mut Vec<QueryHit>,
) -> bool {
    let surface_velocity = B::body_velocity_at(world, hit.entity, hit.position);
    if !velocity_allows_grounding(ctx.world_velocity, surface_velocity, hit.normal) {
        return false;
    }

    if passes_slope_test(ctx.config, hit.normal, ctx.grounding_up) {
        return true;
    }

    if allow_step_probe
        && ctx.config.step_handling
        && !hit.surface.is_dynamic
        && is_underside_contact(hit.position, ctx.feet, ctx.grounding_up, ctx.config)
    {
        return step_probe_finds_walkable_top::<B>(world, ctx, hit, probe_buffer);
    }

    false
}

/// Secondary probe over an obstruction: cast down from above the step
/// height, nudged into the surface, and look for a walkable static top.
fn step_probe_finds_walkable_top<B: CollisionBackend>(
    world: &mut World,
    ctx: &GroundingContext,
    hit: &QueryHit,
    probe_buffer: &mut Vec<QueryHit>,
) -> bool {
    let config = ctx.config;
    let into_surface = math::project_on_plane(-hit.normal, ctx.grounding_up).normalize_or_zero();
    if into_surface == Vec3::ZERO {
        return false;
    }

    let start = ctx.center
        + ctx.grounding_up * config.max_step_height
        + into_surface * (config.step_forward_distance + config.collision_margin * 2.0);
    B::cast_collider(
        world,
        &ctx.capsule,
        start,
        ctx.rotation,
        -ctx.grounding_up,
        config.max_step_height,
        &ctx.filter,
        probe_buffer,
    );

    probe_buffer
        .iter()
        .find(|probe| probe.surface.response == CollisionResponse::Collide)
        .is_some_and(|probe| {
            !probe.surface.is_dynamic
                && probe.distance > config.collision_margin
                && passes_slope_test(config, probe.normal, ctx.grounding_up)
        })
}
