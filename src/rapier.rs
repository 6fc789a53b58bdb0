//! Rapier 3D collision backend.
//!
//! This module provides the collision backend for Bevy Rapier 3D.
//! Enable with the `rapier3d` feature.
//!
//! Rapier has no notion of the controller's surface tags; attach a
//! [`SurfaceTags`] component to colliders that should carry tag bits
//! (water, climbable, platform).

use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use bevy_rapier3d::na;
use bevy_rapier3d::parry::math::Isometry;
use bevy_rapier3d::parry::query;
use bevy_rapier3d::prelude::*;

use crate::backend::{CollisionBackend, CollisionFilter, NoOpBackendPlugin};
use crate::collision::{CollisionResponse, PointProjection, QueryHit, SurfaceInfo};
use crate::config::CapsuleGeometry;
use crate::impulse::DeferredImpulse;

/// Application-defined tag bits for a collider, read back through the
/// adapter's surface introspection.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct SurfaceTags(pub u32);

/// Rapier 3D collision backend for the character controller.
///
/// Queries go through the `RapierContext` query pipeline; velocity, mass
/// and impulse access goes through the usual Rapier components with a
/// velocity fallback when a body has no `ExternalImpulse`.
pub struct Rapier3dBackend;

fn capsule_collider(shape: &CapsuleGeometry) -> Collider {
    Collider::capsule_y(shape.half_segment(), shape.radius)
}

fn to_query_filter(filter: &CollisionFilter) -> QueryFilter<'static> {
    let mut query_filter = QueryFilter::default();
    if let Some(exclude) = filter.exclude {
        query_filter = query_filter.exclude_rigid_body(exclude);
    }
    if !filter.include_triggers {
        query_filter = query_filter.exclude_sensors();
    }
    if let Some((memberships, filters)) = filter.groups {
        query_filter = query_filter.groups(CollisionGroups::new(
            Group::from_bits_truncate(memberships),
            Group::from_bits_truncate(filters),
        ));
    }
    query_filter
}

fn resolve_surface(world: &World, entity: Entity) -> SurfaceInfo {
    SurfaceInfo {
        tags: world.get::<SurfaceTags>(entity).map(|tags| tags.0).unwrap_or(0),
        response: if world.get::<Sensor>(entity).is_some() {
            CollisionResponse::Trigger
        } else {
            CollisionResponse::Collide
        },
        is_dynamic: matches!(world.get::<RigidBody>(entity), Some(RigidBody::Dynamic)),
    }
}

fn passes_tag_filter(world: &World, entity: Entity, filter: &CollisionFilter) -> bool {
    filter.required_tags == 0
        || world
            .get::<SurfaceTags>(entity)
            .is_some_and(|tags| tags.0 & filter.required_tags != 0)
}

fn to_iso(translation: Vec3, rotation: Quat) -> Isometry<f32> {
    Isometry::from_parts(
        na::Translation3::new(translation.x, translation.y, translation.z),
        na::Unit::new_normalize(na::Quaternion::new(
            rotation.w, rotation.x, rotation.y, rotation.z,
        )),
    )
}

fn from_na_point(point: &na::Point3<f32>) -> Vec3 {
    Vec3::new(point.x, point.y, point.z)
}

fn from_na_vector(vector: &na::Vector3<f32>) -> Vec3 {
    Vec3::new(vector.x, vector.y, vector.z)
}

impl CollisionBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        NoOpBackendPlugin
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
        if direction.length_squared() <= crate::math::SQUARED_EPSILON || !position.is_finite() {
            return;
        }

        let collider = capsule_collider(shape);
        let query_filter = to_query_filter(filter);
        let mut context_state = SystemState::<ReadRapierContext>::new(world);
        let hit = {
            let context = context_state.get(world).single();
            context.cast_shape(
                position,
                rotation,
                direction,
                &collider,
                ShapeCastOptions {
                    max_time_of_impact: max_distance,
                    stop_at_penetration: true,
                    compute_impact_geometry_on_penetration: true,
                    ..Default::default()
                },
                query_filter,
            )
        };

        let Some((entity, cast_hit)) = hit else {
            return;
        };
        if !passes_tag_filter(world, entity, filter) {
            return;
        }
        let Some(details) = cast_hit.details else {
            return;
        };
        out.push(
            QueryHit::new(
                entity,
                cast_hit.time_of_impact,
                // Witness point and outward normal on the hit collider.
                details.witness2,
                details.normal2,
            )
            .with_surface(resolve_surface(world, entity)),
        );
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

        // Broad pass with an inflated capsule, then exact contacts against
        // the real capsule with the distance as the contact prediction.
        let inflated = capsule_collider(&CapsuleGeometry::new(
            shape.radius + max_distance.max(0.0),
            shape.height + max_distance.max(0.0) * 2.0,
        ));
        let query_filter = to_query_filter(filter);
        let mut context_state = SystemState::<ReadRapierContext>::new(world);
        let mut candidates: Vec<Entity> = Vec::new();
        {
            let context = context_state.get(world).single();
            context.intersections_with_shape(
                position,
                rotation,
                &inflated,
                query_filter,
                |entity| {
                    candidates.push(entity);
                    true
                },
            );
        }

        let capsule = capsule_collider(shape);
        let capsule_iso = to_iso(position, rotation);
        for entity in candidates {
            if !passes_tag_filter(world, entity, filter) {
                continue;
            }
            let (Some(other_collider), Some(other_transform)) = (
                world.get::<Collider>(entity),
                world.get::<GlobalTransform>(entity),
            ) else {
                continue;
            };
            let (_, other_rotation, other_translation) =
                other_transform.to_scale_rotation_translation();
            let other_iso = to_iso(other_translation, other_rotation);

            let Ok(Some(contact)) = query::contact(
                &capsule_iso,
                capsule.raw.as_ref(),
                &other_iso,
                other_collider.raw.as_ref(),
                max_distance.max(0.0),
            ) else {
                continue;
            };
            if contact.dist > max_distance {
                continue;
            }
            out.push(
                QueryHit::new(
                    entity,
                    contact.dist,
                    from_na_point(&contact.point2),
                    from_na_vector(&contact.normal2),
                    // normal2 is the outward normal on the other collider.
                )
                .with_surface(resolve_surface(world, entity)),
            );
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
        let query_filter = to_query_filter(filter);
        let mut context_state = SystemState::<ReadRapierContext>::new(world);
        let projection = {
            let context = context_state.get(world).single();
            context.project_point(point, true, query_filter)
        };

        let (entity, projection) = projection?;
        if !passes_tag_filter(world, entity, filter) {
            return None;
        }
        let offset = point - projection.point;
        let distance = if projection.is_inside {
            -offset.length()
        } else {
            offset.length()
        };
        if distance > max_distance {
            return None;
        }
        Some(PointProjection {
            entity,
            point: projection.point,
            distance,
            is_inside: projection.is_inside,
            surface: resolve_surface(world, entity),
        })
    }

    fn body_transform(world: &World, entity: Entity) -> Option<(Vec3, Quat)> {
        world
            .get::<GlobalTransform>(entity)
            .map(|transform| {
                let (_, rotation, translation) = transform.to_scale_rotation_translation();
                (translation, rotation)
            })
            .or_else(|| {
                world
                    .get::<Transform>(entity)
                    .map(|transform| (transform.translation, transform.rotation))
            })
    }

    fn body_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|velocity| velocity.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn body_velocity_at(world: &World, entity: Entity, point: Vec3) -> Vec3 {
        let Some(velocity) = world.get::<Velocity>(entity) else {
            return Vec3::ZERO;
        };
        let pivot = Self::body_transform(world, entity)
            .map(|(translation, _)| translation)
            .unwrap_or(point);
        velocity.linvel + velocity.angvel.cross(point - pivot)
    }

    fn body_mass(world: &World, entity: Entity) -> f32 {
        world
            .get::<ReadMassProperties>(entity)
            .map(|properties| properties.mass)
            .filter(|mass| mass.is_finite() && *mass > 0.0)
            .unwrap_or(0.0)
    }

    fn apply_impulse(world: &mut World, impulse: &DeferredImpulse) {
        if impulse.linear != Vec3::ZERO || impulse.angular != Vec3::ZERO {
            let mass = Self::body_mass(world, impulse.target);
            if let Some(mut external) = world.get_mut::<ExternalImpulse>(impulse.target) {
                external.impulse += impulse.linear;
                external.torque_impulse += impulse.angular;
            } else if let Some(mut velocity) = world.get_mut::<Velocity>(impulse.target) {
                // Fallback: apply as a velocity change if the body has no
                // ExternalImpulse component.
                if mass > 0.0 {
                    velocity.linvel += impulse.linear / mass;
                }
            }
        }
        if impulse.displacement != Vec3::ZERO {
            if let Some(mut transform) = world.get_mut::<Transform>(impulse.target) {
                transform.translation += impulse.displacement;
            }
        }
    }
}
