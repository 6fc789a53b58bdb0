//! Collision backend abstraction.
//!
//! This module defines the trait collision backends must implement for the
//! character controller to query the physics world. It keeps the solver
//! independent of the physics engine: the crate ships a `bevy_rapier3d`
//! implementation behind the `rapier3d` feature and an analytic fixture
//! world behind `fixture-backend`.
//!
//! Backends are query providers, not simulators: during a character's
//! update every method must behave as a read of a frozen snapshot of the
//! tick's broad phase. The only mutation entry point is
//! [`CollisionBackend::apply_impulse`], which the controller calls strictly
//! after all characters have finished their primary update.

use bevy::prelude::*;

use crate::collision::{PointProjection, QueryHit};
use crate::config::CapsuleGeometry;
use crate::impulse::DeferredImpulse;

/// Filter applied to collision queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionFilter {
    /// Entity excluded from results, usually the querying character.
    pub exclude: Option<Entity>,
    /// Collision group (memberships, filters) pair, backend-interpreted.
    pub groups: Option<(u32, u32)>,
    /// Whether trigger-only volumes are reported.
    pub include_triggers: bool,
    /// When non-zero, only surfaces carrying at least one of these tag bits
    /// are reported.
    pub required_tags: u32,
}

impl CollisionFilter {
    /// Filter for solid-geometry queries from the given character.
    pub fn solid(character: Entity, groups: Option<(u32, u32)>) -> Self {
        Self {
            exclude: Some(character),
            groups,
            include_triggers: false,
            required_tags: 0,
        }
    }

    /// Filter for overlap volumes carrying specific tags (water volumes and
    /// the like).
    pub fn tagged_volumes(character: Entity, tags: u32) -> Self {
        Self {
            exclude: Some(character),
            groups: None,
            include_triggers: true,
            required_tags: tags,
        }
    }
}

/// Trait for collision backend implementations.
///
/// Implement this to integrate a physics engine with the controller. Methods
/// are associated functions over the [`World`] so the solver can call them
/// from its exclusive update, mirroring how the rest of the crate accesses
/// backend state.
///
/// Malformed inputs (zero-length cast directions, non-finite positions) must
/// yield no hits rather than panic. Results that reference entities the
/// backend cannot resolve are the backend's own bug; implementations should
/// `debug_assert!` and drop such hits.
pub trait CollisionBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Sweep a capsule along `direction` and collect hits into `out`,
    /// ordered by increasing distance.
    ///
    /// `position` is the capsule center; `rotation` orients the capsule's
    /// long axis. `direction` should be normalized; a zero direction yields
    /// no hits. Existing contents of `out` are cleared.
    fn cast_collider(
        world: &mut World,
        shape: &CapsuleGeometry,
        position: Vec3,
        rotation: Quat,
        direction: Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
        out: &mut Vec<QueryHit>,
    );

    /// Collect every collider within `max_distance` of the capsule into
    /// `out`, with negative distances for interpenetration. Existing
    /// contents of `out` are cleared.
    fn calculate_distance(
        world: &mut World,
        shape: &CapsuleGeometry,
        position: Vec3,
        rotation: Quat,
        max_distance: f32,
        filter: &CollisionFilter,
        out: &mut Vec<QueryHit>,
    );

    /// Project a point onto the closest surface within `max_distance`.
    fn point_distance(
        world: &mut World,
        point: Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<PointProjection>;

    /// Translation and rotation of a body, if it still exists.
    fn body_transform(world: &World, entity: Entity) -> Option<(Vec3, Quat)>;

    /// Linear velocity of a body. Zero for static geometry.
    fn body_velocity(world: &World, entity: Entity) -> Vec3;

    /// Velocity of a body at a world-space point. The default ignores
    /// angular velocity.
    fn body_velocity_at(world: &World, entity: Entity, _point: Vec3) -> Vec3 {
        Self::body_velocity(world, entity)
    }

    /// Mass of a body. Zero means immovable.
    fn body_mass(_world: &World, _entity: Entity) -> f32 {
        0.0
    }

    /// Apply a deferred impulse to its target body. Called only from the
    /// apply pass, after every character has updated.
    fn apply_impulse(world: &mut World, impulse: &DeferredImpulse);

    /// Fixed timestep of the simulation schedule.
    fn fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&dt| dt > 0.0)
            .unwrap_or(1.0 / 64.0)
    }
}

/// Empty plugin for backends that need no additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_filter_excludes_character_and_triggers() {
        let character = Entity::from_raw(4);
        let filter = CollisionFilter::solid(character, Some((1, 2)));
        assert_eq!(filter.exclude, Some(character));
        assert_eq!(filter.groups, Some((1, 2)));
        assert!(!filter.include_triggers);
        assert_eq!(filter.required_tags, 0);
    }

    #[test]
    fn tagged_volume_filter_includes_triggers() {
        let filter = CollisionFilter::tagged_volumes(Entity::from_raw(4), 0b100);
        assert!(filter.include_triggers);
        assert_eq!(filter.required_tags, 0b100);
    }
}
