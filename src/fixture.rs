//! Analytic collision world for tests and examples.
//!
//! A [`CollisionBackend`] over half-spaces and axis-aligned cuboids with
//! closed-form capsule queries. No broad phase, no solver: the geometry is
//! exact, deterministic and cheap, which is what controller tests want.
//!
//! Cuboid queries treat the capsule as upright (its long axis along world
//! up); the character rotation is ignored for them. Test scenes use upright
//! characters and axis-aligned geometry, where the expanded-extents
//! approximation is exact on faces.

use bevy::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter};
use crate::collision::{CollisionResponse, PointProjection, QueryHit, SurfaceInfo};
use crate::config::CapsuleGeometry;
use crate::impulse::DeferredImpulse;
use crate::math;
use crate::CharacterSystemSet;

/// Shape of a fixture collider.
#[derive(Debug, Clone, Copy)]
pub enum FixtureShape {
    /// Solid everything behind the plane through the collider's translation.
    HalfSpace { normal: Vec3 },
    /// Axis-aligned box around the collider's translation.
    Cuboid { half_extents: Vec3 },
}

/// A collider in the fixture world.
#[derive(Component, Debug, Clone)]
pub struct FixtureCollider {
    pub shape: FixtureShape,
    pub translation: Vec3,
    pub tags: u32,
    pub response: CollisionResponse,
    pub is_dynamic: bool,
    pub velocity: Vec3,
    pub mass: f32,
}

impl FixtureCollider {
    pub fn half_space(normal: Vec3) -> Self {
        Self {
            shape: FixtureShape::HalfSpace {
                normal: normal.normalize(),
            },
            translation: Vec3::ZERO,
            tags: 0,
            response: CollisionResponse::Collide,
            is_dynamic: false,
            velocity: Vec3::ZERO,
            mass: 0.0,
        }
    }

    /// A horizontal floor at the given height.
    pub fn floor(height: f32) -> Self {
        Self::half_space(Vec3::Y).at(Vec3::new(0.0, height, 0.0))
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self {
            shape: FixtureShape::Cuboid { half_extents },
            translation: Vec3::ZERO,
            tags: 0,
            response: CollisionResponse::Collide,
            is_dynamic: false,
            velocity: Vec3::ZERO,
            mass: 0.0,
        }
    }

    pub fn at(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_tags(mut self, tags: u32) -> Self {
        self.tags = tags;
        self
    }

    pub fn as_trigger(mut self) -> Self {
        self.response = CollisionResponse::Trigger;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn dynamic(mut self, mass: f32) -> Self {
        self.is_dynamic = true;
        self.mass = mass;
        self
    }

    fn surface(&self) -> SurfaceInfo {
        SurfaceInfo {
            tags: self.tags,
            response: self.response,
            is_dynamic: self.is_dynamic,
        }
    }
}

fn filter_allows(filter: &CollisionFilter, entity: Entity, collider: &FixtureCollider) -> bool {
    if filter.exclude == Some(entity) {
        return false;
    }
    match collider.response {
        CollisionResponse::Ignore => return false,
        CollisionResponse::Trigger if !filter.include_triggers => return false,
        _ => {}
    }
    if filter.required_tags != 0 && collider.tags & filter.required_tags == 0 {
        return false;
    }
    true
}

/// Capsule support distance toward the negative of a plane normal.
fn capsule_support(shape: &CapsuleGeometry, rotation: Quat, normal: Vec3) -> f32 {
    let axis = rotation * Vec3::Y;
    shape.radius + shape.half_segment() * axis.dot(normal).abs()
}

/// The capsule's extreme point toward `-normal`.
fn capsule_support_point(
    shape: &CapsuleGeometry,
    center: Vec3,
    rotation: Quat,
    normal: Vec3,
) -> Vec3 {
    let axis = rotation * Vec3::Y;
    let along = axis.dot(normal);
    let endpoint = if along.abs() <= math::EPSILON {
        Vec3::ZERO
    } else {
        -axis * shape.half_segment() * along.signum()
    };
    center + endpoint - normal * shape.radius
}

/// Capsule extents for the expanded-box (Minkowski) cuboid queries.
fn capsule_expansion(shape: &CapsuleGeometry) -> Vec3 {
    Vec3::new(
        shape.radius,
        shape.radius + shape.half_segment(),
        shape.radius,
    )
}

fn cast_against_half_space(
    shape: &CapsuleGeometry,
    center: Vec3,
    rotation: Quat,
    direction: Vec3,
    max_distance: f32,
    normal: Vec3,
    plane_point: Vec3,
) -> Option<(f32, Vec3)> {
    let support = capsule_support(shape, rotation, normal);
    let clearance = (center - plane_point).dot(normal) - support;
    let closing = -direction.dot(normal);

    if clearance < 0.0 {
        // Already touching or inside; a hit only if still moving in.
        return (closing > math::EPSILON).then_some((0.0, normal));
    }
    if closing <= math::EPSILON {
        return None;
    }
    let t = clearance / closing;
    (t <= max_distance).then_some((t, normal))
}

fn cast_against_cuboid(
    shape: &CapsuleGeometry,
    center: Vec3,
    direction: Vec3,
    max_distance: f32,
    box_center: Vec3,
    half_extents: Vec3,
) -> Option<(f32, Vec3)> {
    let expanded = half_extents + capsule_expansion(shape);
    let min = box_center - expanded;
    let max = box_center + expanded;

    // Slab intersection of the ray with the expanded box.
    let mut t_entry = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut entry_axis = 0;
    for axis in 0..3 {
        let origin = center[axis];
        let d = direction[axis];
        if d.abs() <= 1e-8 {
            if origin < min[axis] || origin > max[axis] {
                return None;
            }
            continue;
        }
        let mut t0 = (min[axis] - origin) / d;
        let mut t1 = (max[axis] - origin) / d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_entry {
            t_entry = t0;
            entry_axis = axis;
        }
        t_exit = t_exit.min(t1);
        if t_entry > t_exit {
            return None;
        }
    }

    if t_exit < 0.0 || t_entry > max_distance {
        return None;
    }
    let mut normal = Vec3::ZERO;
    normal[entry_axis] = -direction[entry_axis].signum();
    if normal == Vec3::ZERO {
        return None;
    }
    // Starting inside reports an immediate hit when still moving inward.
    let t = t_entry.max(0.0);
    if t_entry < 0.0 && direction.dot(normal) >= -math::EPSILON {
        return None;
    }
    Some((t, normal))
}

fn distance_to_cuboid(
    shape: &CapsuleGeometry,
    center: Vec3,
    box_center: Vec3,
    half_extents: Vec3,
) -> (f32, Vec3) {
    let expanded = half_extents + capsule_expansion(shape);
    let local = center - box_center;
    let q = local.abs() - expanded;

    if q.max_element() <= 0.0 {
        // Inside: depth to the nearest face.
        let mut best_axis = 0;
        for axis in 1..3 {
            if q[axis] > q[best_axis] {
                best_axis = axis;
            }
        }
        let mut normal = Vec3::ZERO;
        normal[best_axis] = local[best_axis].signum();
        if normal[best_axis] == 0.0 {
            normal[best_axis] = 1.0;
        }
        (q[best_axis], normal)
    } else {
        let gap = q.max(Vec3::ZERO);
        let distance = gap.length();
        let mut outward = Vec3::ZERO;
        for axis in 0..3 {
            if q[axis] > 0.0 {
                outward[axis] = gap[axis] * local[axis].signum();
            }
        }
        (distance, outward.normalize_or_zero())
    }
}

/// The fixture collision backend.
pub struct FixtureBackend;

impl CollisionBackend for FixtureBackend {
    fn plugin() -> impl Plugin {
        FixtureBackendPlugin
    }

    fn cast_collider(
        world: &mut World,
        shape: &CapsuleGeometry,
        position: Vec3,
        rotation: Quat,
        direction: Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
        out: &mut Vec<QueryHit>,
    ) {
        out.clear();
        if direction.length_squared() <= math::SQUARED_EPSILON || !position.is_finite() {
            return;
        }
        let mut query = world.query::<(Entity, &FixtureCollider)>();
        for (entity, collider) in query.iter(world) {
            if !filter_allows(filter, entity, collider) {
                continue;
            }
            let result = match collider.shape {
                FixtureShape::HalfSpace { normal } => cast_against_half_space(
                    shape,
                    position,
                    rotation,
                    direction,
                    max_distance,
                    normal,
                    collider.translation,
                ),
                FixtureShape::Cuboid { half_extents } => cast_against_cuboid(
                    shape,
                    position,
                    direction,
                    max_distance,
                    collider.translation,
                    half_extents,
                ),
            };
            if let Some((distance, normal)) = result {
                let contact_center = position + direction * distance;
                let contact = match collider.shape {
                    FixtureShape::HalfSpace { .. } => {
                        capsule_support_point(shape, contact_center, rotation, normal)
                    }
                    FixtureShape::Cuboid { half_extents } => (contact_center - collider.translation)
                        .clamp(-half_extents, half_extents)
                        + collider.translation,
                };
                out.push(
                    QueryHit::new(entity, distance, contact, normal)
                        .with_surface(collider.surface()),
                );
            }
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    fn calculate_distance(
        world: &mut World,
        shape: &CapsuleGeometry,
        position: Vec3,
        rotation: Quat,
        max_distance: f32,
        filter: &CollisionFilter,
        out: &mut Vec<QueryHit>,
    ) {
        out.clear();
        if !position.is_finite() {
            return;
        }
        let mut query = world.query::<(Entity, &FixtureCollider)>();
        for (entity, collider) in query.iter(world) {
            if !filter_allows(filter, entity, collider) {
                continue;
            }
            let (distance, normal) = match collider.shape {
                FixtureShape::HalfSpace { normal } => {
                    let support = capsule_support(shape, rotation, normal);
                    let clearance = (position - collider.translation).dot(normal) - support;
                    (clearance, normal)
                }
                FixtureShape::Cuboid { half_extents } => {
                    distance_to_cuboid(shape, position, collider.translation, half_extents)
                }
            };
            if distance <= max_distance && normal != Vec3::ZERO {
                let contact = capsule_support_point(shape, position, rotation, normal) - normal * distance;
                out.push(
                    QueryHit::new(entity, distance, contact, normal)
                        .with_surface(collider.surface()),
                );
            }
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    fn point_distance(
        world: &mut World,
        point: Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<PointProjection> {
        if !point.is_finite() {
            return None;
        }
        let mut best: Option<PointProjection> = None;
        let mut query = world.query::<(Entity, &FixtureCollider)>();
        for (entity, collider) in query.iter(world) {
            if !filter_allows(filter, entity, collider) {
                continue;
            }
            let (distance, surface_point) = match collider.shape {
                FixtureShape::HalfSpace { normal } => {
                    let d = (point - collider.translation).dot(normal);
                    (d, point - normal * d)
                }
                FixtureShape::Cuboid { half_extents } => {
                    let local = point - collider.translation;
                    let clamped = local.clamp(-half_extents, half_extents);
                    if local == clamped {
                        let q = local.abs() - half_extents;
                        (q.max_element(), collider.translation + clamped)
                    } else {
                        (
                            (local - clamped).length(),
                            collider.translation + clamped,
                        )
                    }
                }
            };
            if distance > max_distance {
                continue;
            }
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(PointProjection {
                    entity,
                    point: surface_point,
                    distance,
                    is_inside: distance < 0.0,
                    surface: collider.surface(),
                });
            }
        }
        best
    }

    fn body_transform(world: &World, entity: Entity) -> Option<(Vec3, Quat)> {
        world
            .get::<FixtureCollider>(entity)
            .map(|collider| (collider.translation, Quat::IDENTITY))
    }

    fn body_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<FixtureCollider>(entity)
            .map(|collider| collider.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn body_mass(world: &World, entity: Entity) -> f32 {
        world
            .get::<FixtureCollider>(entity)
            .filter(|collider| collider.is_dynamic)
            .map(|collider| collider.mass)
            .unwrap_or(0.0)
    }

    fn apply_impulse(world: &mut World, impulse: &DeferredImpulse) {
        let Some(mut collider) = world.get_mut::<FixtureCollider>(impulse.target) else {
            return;
        };
        if !collider.is_dynamic {
            return;
        }
        if collider.mass > 0.0 {
            let delta = impulse.linear / collider.mass;
            collider.velocity += delta;
        }
        collider.translation += impulse.displacement;
    }
}

/// Registers the fixture motion system.
pub struct FixtureBackendPlugin;

impl Plugin for FixtureBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            advance_fixture_colliders.in_set(CharacterSystemSet::BeginTick),
        );
    }
}

/// Carry moving fixture colliders (platforms, elevators) by their velocity
/// before the characters solve against them.
pub fn advance_fixture_colliders(time: Res<Time>, mut query: Query<&mut FixtureCollider>) {
    let dt = time.delta_secs();
    for mut collider in &mut query {
        if collider.velocity != Vec3::ZERO {
            let step = collider.velocity * dt;
            collider.translation += step;
        }
    }
}
