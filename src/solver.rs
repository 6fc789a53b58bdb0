//! The movement solver.
//!
//! An ordered sequence of phases the active locomotion state invokes around
//! its own velocity shaping: parent tracking and grounding first, then
//! overlap decollision, continuous collide-and-slide movement with step
//! handling, moving-platform detection and the stateful hit stream.
//!
//! Phases never throw: malformed query results are dropped, degenerate
//! geometry is a no-op, and iteration exhaustion falls back to the
//! configured policy. Effects on other bodies are queued as deferred
//! impulses, never applied inline.

use bevy::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter};
use crate::body::{CharacterBody, ParentLink};
use crate::collision::{
    CharacterHit, CollisionResponse, GroundHit, PreviousHit, QueryHit, TickBuffers,
    VelocityProjectionHit,
};
use crate::config::{CapsuleGeometry, CharacterConfig};
use crate::events::{CharacterHitEvent, HitPhase, StateTransitionEvent};
use crate::grounding::{self, GroundingContext};
use crate::impulse::{DeferredImpulse, DeferredImpulseQueue};
use crate::input::MoveInput;
use crate::math::{self, EPSILON};
use crate::projection;
use crate::states::CharacterStateMachine;

/// Per-character working set for one tick.
///
/// The update system takes the character's components out of the world,
/// lets the state machine and solver phases work on this context while the
/// world is only used for collision queries, and writes the results back.
pub struct CharacterContext<'a> {
    pub entity: Entity,
    pub dt: f32,
    pub body: CharacterBody,
    pub config: CharacterConfig,
    pub input: MoveInput,
    /// Feet anchor position, world space.
    pub position: Vec3,
    pub rotation: Quat,
    pub buffers: &'a mut TickBuffers,
    pub impulses: &'a mut DeferredImpulseQueue,
    pub hit_events: &'a mut Vec<CharacterHitEvent>,
    pub state_events: &'a mut Vec<StateTransitionEvent>,
}

impl CharacterContext<'_> {
    /// Capsule geometry of the current stance.
    pub fn capsule(&self) -> CapsuleGeometry {
        self.config.capsule(self.body.stance)
    }

    /// The character's local up axis.
    pub fn up(&self) -> Vec3 {
        let up = self.rotation * Vec3::Y;
        if up.length_squared() > math::SQUARED_EPSILON {
            up.normalize()
        } else {
            Vec3::Y
        }
    }

    /// Capsule center for the current stance, world space.
    pub fn capsule_center(&self) -> Vec3 {
        self.position + self.up() * self.capsule().center_offset()
    }

    /// Query filter for solid geometry, excluding the character itself.
    pub fn solid_filter(&self) -> CollisionFilter {
        CollisionFilter::solid(self.entity, self.config.collision_groups)
    }
}

/// Snapshot grounding, reset the tick accumulators, advance timers.
pub fn initialize_update(ctx: &mut CharacterContext) {
    ctx.buffers.reset();
    ctx.body.was_grounded_before_update = ctx.body.is_grounded;
    ctx.body.last_physics_delta = ctx.dt;
    ctx.body.grounding_suppressed = false;

    if ctx.body.is_grounded {
        ctx.body.time_since_grounded = 0.0;
    } else {
        ctx.body.time_since_grounded += ctx.dt;
    }

    if ctx.input.jump_pressed {
        ctx.body.jump_buffer = ctx.config.jump_buffer_time.max(ctx.dt);
    } else {
        ctx.body.jump_buffer = (ctx.body.jump_buffer - ctx.dt).max(0.0);
    }
}

/// Follow the parent body rigidly: the platform's motion is not colliding
/// movement, the character is simply carried.
pub fn parent_movement_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    let Some(link) = ctx.body.parent else {
        return;
    };
    let Some((parent_position, parent_rotation)) = B::body_transform(world, link.entity) else {
        // Parent disappeared: detach and keep its momentum.
        ctx.body.relative_velocity += ctx.body.parent_velocity;
        ctx.body.parent = None;
        ctx.body.parent_velocity = Vec3::ZERO;
        return;
    };
    ctx.position = parent_position + parent_rotation * link.anchor;
    ctx.rotation = (parent_rotation * link.rotation_from_parent).normalize();
    ctx.body.parent_velocity = B::body_velocity_at(world, link.entity, ctx.position);
}

/// Recompute the up axis, probe for ground below and apply ground snapping.
///
/// The probe is a distance query, not a cast: it reports surrounding
/// geometry within reach, from which the closest upward-facing surface that
/// passes the grounding evaluator becomes the new ground hit.
pub fn grounding_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    ctx.body.grounding_up = ctx.up();

    let was_grounded = ctx.body.was_grounded_before_update;
    ctx.body.is_grounded = false;
    ctx.body.ground_hit = None;

    let config = &ctx.config;
    let contact_reach = config.collision_margin * 3.0;
    let snap_allowed = was_grounded && config.snap_to_ground && !ctx.body.snapping_suppressed;
    let snap_reach = if snap_allowed {
        config.ground_snap_distance
    } else {
        0.0
    };

    let capsule = ctx.capsule();
    let center = ctx.capsule_center();
    let filter = ctx.solid_filter();
    let up = ctx.body.grounding_up;

    B::calculate_distance(
        world,
        &capsule,
        center,
        ctx.rotation,
        contact_reach + snap_reach,
        &filter,
        &mut ctx.buffers.distance_hits,
    );

    let mut candidate: Option<QueryHit> = None;
    for index in 0..ctx.buffers.distance_hits.len() {
        let hit = ctx.buffers.distance_hits[index];
        if !query_hit_is_sane(&hit) {
            continue;
        }
        if hit.surface.response != CollisionResponse::Collide {
            continue;
        }
        if hit.normal.dot(up) <= EPSILON {
            continue;
        }
        if candidate.is_some_and(|best| best.distance <= hit.distance) {
            continue;
        }
        let grounding_ctx = GroundingContext {
            config: &ctx.config,
            capsule,
            center,
            rotation: ctx.rotation,
            feet: ctx.position,
            grounding_up: up,
            world_velocity: ctx.body.world_velocity(),
            filter,
        };
        if grounding::is_grounded_on_hit::<B>(
            world,
            &grounding_ctx,
            &hit,
            true,
            &mut ctx.buffers.probe_hits,
        ) {
            candidate = Some(hit);
        }
    }

    let Some(ground) = candidate else {
        return;
    };
    if ground.distance > contact_reach && !snap_allowed {
        return;
    }

    ctx.body.is_grounded = true;
    ctx.body.ground_hit = Some(GroundHit::from_query(&ground));
    ctx.body.time_since_grounded = 0.0;

    if snap_allowed && ground.distance > ctx.config.collision_margin {
        ctx.position -= up * (ground.distance - ctx.config.collision_margin);
    }
}

/// Look ahead along the velocity and release grounding before a sharp
/// convex slope change, so the character launches off ledges instead of
/// flickering between grounded and airborne while snapping over them.
pub fn prevent_grounding_from_future_slope_change_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
) {
    if !ctx.config.prevent_grounding_on_future_slope_change || !ctx.body.is_grounded {
        return;
    }
    let Some(ground) = ctx.body.ground_hit else {
        return;
    };
    let up = ctx.body.grounding_up;
    let lateral = math::project_on_plane(ctx.body.relative_velocity, up);
    let lateral_speed = lateral.length();
    if lateral_speed <= EPSILON {
        return;
    }
    let direction = lateral / lateral_speed;

    let capsule = ctx.capsule();
    let lookahead = lateral_speed * ctx.dt + capsule.radius;
    let probe_center = ctx.capsule_center() + direction * lookahead;
    let probe_depth =
        ctx.config.max_step_height + ctx.config.ground_snap_distance + ctx.config.collision_margin;
    let filter = ctx.solid_filter();

    B::cast_collider(
        world,
        &capsule,
        probe_center,
        ctx.rotation,
        -up,
        probe_depth,
        &filter,
        &mut ctx.buffers.probe_hits,
    );

    let future_normal = ctx
        .buffers
        .probe_hits
        .iter()
        .find(|hit| hit.surface.response == CollisionResponse::Collide && query_hit_is_sane(hit))
        .map(|hit| hit.normal);

    let release = match future_normal {
        // Ledge: nothing below within reach.
        None => true,
        Some(normal) => {
            let angle = ground.normal.dot(normal).clamp(-1.0, 1.0).acos();
            // Only convex changes (surface tilting away along the movement)
            // release grounding; concave ones are handled by projection.
            angle > ctx.config.max_future_slope_change_angle
                && normal.dot(direction) > ground.normal.dot(direction)
        }
    };

    if release {
        ctx.body.unground();
        ctx.body.grounding_suppressed = true;
    }
}

/// Press the character's weight into a dynamic ground body.
pub fn ground_pushing_update(ctx: &mut CharacterContext) {
    if !ctx.config.push_dynamic_bodies || !ctx.body.is_grounded {
        return;
    }
    let Some(ground) = ctx.body.ground_hit else {
        return;
    };
    if !ground.surface.is_dynamic {
        return;
    }
    let weight = ctx.config.gravity * ctx.config.mass * ctx.dt;
    if weight.length_squared() <= math::SQUARED_EPSILON {
        return;
    }
    ctx.impulses
        .push(DeferredImpulse::linear(ground.entity, weight, ground.position));
}

/// Resolve overlaps, then sweep the collider along the velocity.
pub fn movement_and_decollisions_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
) {
    let original_direction = ctx.body.relative_velocity.normalize_or_zero();
    decollision_update::<B>(world, ctx, original_direction);
    continuous_movement_update::<B>(world, ctx, original_direction);
}

/// Push the capsule out of any interpenetrating collider by the minimum
/// separating displacement, deepest overlap first, bounded by the
/// decollision iteration budget.
fn decollision_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    original_direction: Vec3,
) {
    let filter = ctx.solid_filter();
    for _ in 0..ctx.config.max_decollision_iterations {
        let capsule = ctx.capsule();
        B::calculate_distance(
            world,
            &capsule,
            ctx.capsule_center(),
            ctx.rotation,
            0.0,
            &filter,
            &mut ctx.buffers.distance_hits,
        );

        let mut deepest: Option<QueryHit> = None;
        for hit in ctx.buffers.distance_hits.iter() {
            if hit.surface.response != CollisionResponse::Collide || !query_hit_is_sane(hit) {
                continue;
            }
            if hit.distance < 0.0 && deepest.is_none_or(|best| hit.distance < best.distance) {
                deepest = Some(*hit);
            }
        }
        let Some(hit) = deepest else {
            return;
        };

        let correction = hit.normal * (-hit.distance + ctx.config.collision_margin * 0.5);
        if hit.surface.is_dynamic && ctx.config.push_dynamic_bodies {
            // Split the separation with the dynamic body.
            ctx.position += correction * 0.5;
            ctx.impulses
                .push(DeferredImpulse::displacement(hit.entity, -correction * 0.5));
        } else {
            ctx.position += correction;
        }

        record_movement_hit::<B>(world, ctx, hit, original_direction);
    }
}

/// Iteratively cast the capsule along the remaining movement, advancing to
/// the closest hit, stepping over low obstructions, and re-projecting
/// velocity against everything touched so far.
fn continuous_movement_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    original_direction: Vec3,
) {
    let margin = ctx.config.collision_margin;
    let filter = ctx.solid_filter();
    let mut remaining = ctx.body.relative_velocity * ctx.dt;

    for _ in 0..ctx.config.max_movement_iterations {
        let distance_left = remaining.length();
        if distance_left <= EPSILON {
            remaining = Vec3::ZERO;
            break;
        }
        let direction = remaining / distance_left;

        let capsule = ctx.capsule();
        B::cast_collider(
            world,
            &capsule,
            ctx.capsule_center(),
            ctx.rotation,
            direction,
            distance_left + margin,
            &filter,
            &mut ctx.buffers.cast_hits,
        );

        let hit = ctx
            .buffers
            .cast_hits
            .iter()
            .find(|hit| hit.surface.response == CollisionResponse::Collide && query_hit_is_sane(hit))
            .copied();
        let Some(hit) = hit else {
            ctx.position += remaining;
            remaining = Vec3::ZERO;
            break;
        };

        let advance = (hit.distance - margin).max(0.0).min(distance_left);
        ctx.position += direction * advance;
        remaining -= direction * advance;

        if is_step_candidate(ctx, &hit) {
            if let Some(step) = try_step_up::<B>(world, ctx, direction, &filter) {
                ctx.position += step.offset;
                remaining -= direction * step.offset.dot(direction).clamp(0.0, remaining.length());
                continue;
            }
        }

        let speed_before = ctx.body.relative_velocity.length();
        record_movement_hit::<B>(world, ctx, hit, original_direction);
        let speed_after = ctx.body.relative_velocity.length();
        if speed_after <= EPSILON || speed_before <= EPSILON {
            remaining = Vec3::ZERO;
            break;
        }

        // Continue with the remainder scaled by how much the projection
        // shortened the velocity, along the projected direction.
        remaining =
            ctx.body.relative_velocity / speed_after * (remaining.length() * speed_after / speed_before);
    }

    if remaining.length() > EPSILON {
        debug!(
            "character {}: movement iteration budget exhausted, {} m discarded",
            ctx.entity,
            remaining.length()
        );
        if !ctx.config.discard_movement_when_exceeded {
            ctx.position += remaining;
        }
        if ctx.config.zero_velocity_when_exceeded {
            ctx.body.relative_velocity = Vec3::ZERO;
        }
    }
}

/// Whether a blocking hit is worth a step-up attempt: a low static contact
/// that is not walkable on its own while the character moves laterally.
fn is_step_candidate(ctx: &CharacterContext, hit: &QueryHit) -> bool {
    if !ctx.config.step_handling || hit.surface.is_dynamic {
        return false;
    }
    if grounding::passes_slope_test(&ctx.config, hit.normal, ctx.body.grounding_up) {
        return false;
    }
    if !grounding::is_underside_contact(hit.position, ctx.position, ctx.body.grounding_up, &ctx.config)
    {
        return false;
    }
    let lateral = math::project_on_plane(ctx.body.relative_velocity, ctx.body.grounding_up);
    lateral.length_squared() > math::SQUARED_EPSILON
}

struct StepUp {
    offset: Vec3,
    surface: QueryHit,
}

/// Probe over a blocking obstruction: a clear forward path at step height
/// plus a walkable static surface below it lets the character climb the
/// step without registering a blocking hit.
fn try_step_up<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    direction: Vec3,
    filter: &CollisionFilter,
) -> Option<StepUp> {
    let config = &ctx.config;
    let up = ctx.body.grounding_up;
    let lateral_direction = math::project_on_plane(direction, up).normalize_or_zero();
    if lateral_direction == Vec3::ZERO {
        return None;
    }

    let capsule = ctx.capsule();
    let center = ctx.capsule_center();
    let forward = config.step_forward_distance + config.collision_margin * 2.0;
    let elevated = center + up * config.max_step_height;

    // The path over the obstruction must be clear.
    B::cast_collider(
        world,
        &capsule,
        elevated,
        ctx.rotation,
        lateral_direction,
        forward,
        filter,
        &mut ctx.buffers.probe_hits,
    );
    if ctx
        .buffers
        .probe_hits
        .iter()
        .any(|hit| hit.surface.response == CollisionResponse::Collide)
    {
        return None;
    }

    // Place the capsule on whatever is below the elevated position.
    let over = elevated + lateral_direction * forward;
    B::cast_collider(
        world,
        &capsule,
        over,
        ctx.rotation,
        -up,
        config.max_step_height + config.collision_margin,
        filter,
        &mut ctx.buffers.probe_hits,
    );
    let surface = ctx
        .buffers
        .probe_hits
        .iter()
        .find(|hit| hit.surface.response == CollisionResponse::Collide && query_hit_is_sane(hit))
        .copied()?;

    if surface.surface.is_dynamic
        || surface.distance >= config.max_step_height
        || !grounding::passes_slope_test(config, surface.normal, up)
    {
        return None;
    }

    let rise = config.max_step_height - surface.distance + config.collision_margin;
    let step = StepUp {
        offset: up * rise + lateral_direction * forward,
        surface,
    };

    // Ground on the step surface through the evaluator, like any other hit.
    let grounding_ctx = GroundingContext {
        config: &ctx.config,
        capsule,
        center: over,
        rotation: ctx.rotation,
        feet: ctx.position + step.offset,
        grounding_up: up,
        world_velocity: ctx.body.world_velocity(),
        filter: *filter,
    };
    if grounding::is_grounded_on_hit::<B>(
        world,
        &grounding_ctx,
        &step.surface,
        false,
        &mut ctx.buffers.probe_hits,
    ) {
        ctx.body.is_grounded = true;
        ctx.body.ground_hit = Some(GroundHit::from_query(&step.surface));
    }

    Some(step)
}

/// Record a hit into the tick accumulators and re-project the velocity
/// against everything accumulated so far.
fn record_movement_hit<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    hit: QueryHit,
    original_direction: Vec3,
) {
    let grounded_on_hit = if ctx.body.grounding_suppressed {
        false
    } else {
        let grounding_ctx = GroundingContext {
            config: &ctx.config,
            capsule: ctx.capsule(),
            center: ctx.capsule_center(),
            rotation: ctx.rotation,
            feet: ctx.position,
            grounding_up: ctx.body.grounding_up,
            world_velocity: ctx.body.world_velocity(),
            filter: ctx.solid_filter(),
        };
        grounding::is_grounded_on_hit::<B>(
            world,
            &grounding_ctx,
            &hit,
            true,
            &mut ctx.buffers.probe_hits,
        )
    };

    let velocity_before = ctx.body.relative_velocity;
    ctx.buffers
        .projection_hits
        .push(VelocityProjectionHit::from_query(&hit, grounded_on_hit));
    projection::project_velocity_on_hits(
        &mut ctx.body.relative_velocity,
        &mut ctx.body.is_grounded,
        &mut ctx.body.ground_hit,
        &ctx.buffers.projection_hits,
        original_direction,
        ctx.body.grounding_up,
    );
    ctx.buffers.character_hits.push(CharacterHit {
        entity: hit.entity,
        position: hit.position,
        normal: hit.normal,
        surface: hit.surface,
        grounded: grounded_on_hit,
        velocity_before,
        velocity_after: ctx.body.relative_velocity,
    });

    if hit.surface.is_dynamic && ctx.config.push_dynamic_bodies {
        queue_dynamic_push::<B>(world, ctx, &hit, velocity_before);
    }
}

/// Queue a momentum exchange with a dynamic body the character ran into.
fn queue_dynamic_push<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    hit: &QueryHit,
    velocity_before: Vec3,
) {
    let other_mass = B::body_mass(world, hit.entity);
    if other_mass <= 0.0 {
        return;
    }
    let relative_velocity = velocity_before - B::body_velocity_at(world, hit.entity, hit.position);
    let closing_speed = -relative_velocity.dot(hit.normal);
    if closing_speed <= 0.0 {
        return;
    }
    // Inelastic exchange through the reduced mass of the pair.
    let reduced_mass = ctx.config.mass * other_mass / (ctx.config.mass + other_mass);
    let impulse = -hit.normal * closing_speed * reduced_mass;
    ctx.impulses
        .push(DeferredImpulse::linear(hit.entity, impulse, hit.position));
}

/// Attach to, follow or detach from a moving-platform parent based on the
/// current ground hit.
pub fn moving_platform_detection_update<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
) {
    let candidate = ctx
        .body
        .ground_hit
        .filter(|ground| ground.surface.has_any_tag(ctx.config.parent_tags))
        .map(|ground| ground.entity);

    match (ctx.body.parent, candidate) {
        (_, Some(parent_entity)) => attach_to_parent::<B>(world, ctx, parent_entity),
        (Some(_), None) => detach_from_parent(ctx),
        (None, None) => {}
    }
}

fn attach_to_parent<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    parent_entity: Entity,
) {
    let Some((parent_position, parent_rotation)) = B::body_transform(world, parent_entity) else {
        detach_from_parent(ctx);
        return;
    };
    let inverse_rotation = parent_rotation.inverse();
    let link = ParentLink {
        entity: parent_entity,
        anchor: inverse_rotation * (ctx.position - parent_position),
        rotation_from_parent: inverse_rotation * ctx.rotation,
    };

    let switching = ctx.body.parent.map(|p| p.entity) != Some(parent_entity);
    if switching {
        // Keep the world velocity continuous across the reparenting.
        let world_velocity = ctx.body.world_velocity();
        let parent_velocity = B::body_velocity_at(world, parent_entity, ctx.position);
        ctx.body.relative_velocity = world_velocity - parent_velocity;
        ctx.body.parent_velocity = parent_velocity;
    }
    ctx.body.parent = Some(link);
}

fn detach_from_parent(ctx: &mut CharacterContext) {
    // Absorb the platform's momentum instantly, with no decay.
    ctx.body.relative_velocity += ctx.body.parent_velocity;
    ctx.body.parent_velocity = Vec3::ZERO;
    ctx.body.parent = None;
}

/// Refresh the recorded parent velocity after detection has settled.
pub fn parent_momentum_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    if let Some(link) = ctx.body.parent {
        ctx.body.parent_velocity = B::body_velocity_at(world, link.entity, ctx.position);
    }
}

/// Convert this tick's raw hit list into enter/stay/exit events.
pub fn process_stateful_hits_update(ctx: &mut CharacterContext) {
    let hits = &ctx.buffers.character_hits;

    for index in 0..hits.len() {
        let hit = hits[index];
        if hits[..index].iter().any(|other| other.entity == hit.entity) {
            continue;
        }
        let phase = if ctx
            .body
            .previous_hits
            .iter()
            .any(|previous| previous.entity == hit.entity)
        {
            HitPhase::Stay
        } else {
            HitPhase::Enter
        };
        ctx.hit_events.push(CharacterHitEvent {
            character: ctx.entity,
            other: hit.entity,
            phase,
            position: hit.position,
            normal: hit.normal,
            surface: hit.surface,
        });
    }

    for previous in ctx.body.previous_hits.iter() {
        if hits.iter().all(|hit| hit.entity != previous.entity) {
            ctx.hit_events.push(CharacterHitEvent {
                character: ctx.entity,
                other: previous.entity,
                phase: HitPhase::Exit,
                position: previous.position,
                normal: previous.normal,
                surface: previous.surface,
            });
        }
    }

    ctx.body.previous_hits.clear();
    for index in 0..hits.len() {
        let hit = hits[index];
        if hits[..index].iter().any(|other| other.entity == hit.entity) {
            continue;
        }
        ctx.body.previous_hits.push(PreviousHit {
            entity: hit.entity,
            position: hit.position,
            normal: hit.normal,
            surface: hit.surface,
        });
    }
}

/// First half of a tick: snapshot and reset, parent tracking, grounding.
pub fn first_phase_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    initialize_update(ctx);
    parent_movement_update::<B>(world, ctx);
    grounding_update::<B>(world, ctx);
}

/// Second half of a tick, after the state's velocity shaping: slope
/// lookahead, ground pushing, movement, platform tracking, hit events.
pub fn second_phase_update<B: CollisionBackend>(world: &mut World, ctx: &mut CharacterContext) {
    prevent_grounding_from_future_slope_change_update::<B>(world, ctx);
    ground_pushing_update(ctx);
    movement_and_decollisions_update::<B>(world, ctx);
    moving_platform_detection_update::<B>(world, ctx);
    parent_momentum_update::<B>(world, ctx);
    process_stateful_hits_update(ctx);
}

/// A query result that can be used without corrupting actor state. Backends
/// own the bug when this fails; debug builds assert, release builds drop
/// the hit.
fn query_hit_is_sane(hit: &QueryHit) -> bool {
    let sane = hit.distance.is_finite()
        && hit.position.is_finite()
        && hit.normal.is_finite()
        && hit.normal.length_squared() > 0.9;
    debug_assert!(sane, "collision backend produced a malformed hit: {hit:?}");
    if !sane {
        warn!("ignoring malformed collision hit against {:?}", hit.entity);
    }
    sane
}

/// Fixed-rate update of every character actor: the parallel-in-principle
/// solve pass. Each actor's full tick completes before the next actor
/// starts; cross-body effects are queued and applied strictly afterwards by
/// [`apply_deferred_impulses`](crate::impulse::apply_deferred_impulses).
pub fn update_characters<B: CollisionBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    if dt <= 0.0 {
        return;
    }

    let mut actor_query = world.query_filtered::<Entity, (
        With<CharacterBody>,
        With<CharacterConfig>,
        With<CharacterStateMachine>,
        With<MoveInput>,
        With<Transform>,
    )>();
    let entities: Vec<Entity> = actor_query.iter(world).collect();

    let mut buffers = std::mem::take(&mut *world.resource_mut::<TickBuffers>());
    let mut impulses = std::mem::take(&mut *world.resource_mut::<DeferredImpulseQueue>());
    let mut hit_events: Vec<CharacterHitEvent> = Vec::new();
    let mut state_events: Vec<StateTransitionEvent> = Vec::new();

    for entity in entities {
        let Some(body) = world.entity_mut(entity).take::<CharacterBody>() else {
            continue;
        };
        let entity_ref = world.entity(entity);
        let (Some(config), Some(input), Some(transform), Some(machine)) = (
            entity_ref.get::<CharacterConfig>().cloned(),
            entity_ref.get::<MoveInput>().cloned(),
            entity_ref.get::<Transform>().copied(),
            entity_ref.get::<CharacterStateMachine>().copied(),
        ) else {
            world.entity_mut(entity).insert(body);
            continue;
        };

        let mut machine = machine;
        let mut ctx = CharacterContext {
            entity,
            dt,
            body,
            config,
            input,
            position: transform.translation,
            rotation: transform.rotation,
            buffers: &mut buffers,
            impulses: &mut impulses,
            hit_events: &mut hit_events,
            state_events: &mut state_events,
        };
        machine.update::<B>(world, &mut ctx);

        let CharacterContext {
            body,
            position,
            rotation,
            ..
        } = ctx;
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
            transform.rotation = rotation;
        }
        world.entity_mut(entity).insert(body);
        if let Some(mut current) = world.get_mut::<CharacterStateMachine>(entity) {
            *current = machine;
        }
    }

    *world.resource_mut::<TickBuffers>() = buffers;
    *world.resource_mut::<DeferredImpulseQueue>() = impulses;
    let _ = world.send_event_batch(hit_events);
    let _ = world.send_event_batch(state_events);
}
