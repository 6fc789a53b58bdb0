//! Hit and collision record types.
//!
//! Value types produced by collision queries and accumulated over a tick.
//! All of them are transient: they live for one physics tick and are cleared
//! when the next tick begins.

use bevy::prelude::*;

/// How a collider responds to the character.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionResponse {
    /// Solid geometry the character collides with.
    #[default]
    Collide,
    /// Overlap-only volume (water, pickup zones). Reported but never blocks.
    Trigger,
    /// Excluded from character queries entirely.
    Ignore,
}

/// Surface properties of a hit body, resolved by the collision backend.
#[derive(Reflect, Debug, Clone, Copy, Default)]
pub struct SurfaceInfo {
    /// Application-defined tag bitmask (water, climbable, platform, ...).
    pub tags: u32,
    /// Collision response policy of the body.
    pub response: CollisionResponse,
    /// Whether the body is dynamic (simulated), as opposed to fixed or
    /// kinematic geometry.
    pub is_dynamic: bool,
}

impl SurfaceInfo {
    /// Check whether any of the given tag bits are set on this surface.
    #[inline]
    pub fn has_any_tag(&self, mask: u32) -> bool {
        self.tags & mask != 0
    }
}

/// A single result from a collider cast or distance query.
///
/// For casts, `distance` is the travel distance along the cast direction at
/// the time of impact. For distance queries it is the separation distance,
/// negative when the shapes interpenetrate.
#[derive(Debug, Clone, Copy)]
pub struct QueryHit {
    /// Body that was hit.
    pub entity: Entity,
    /// Travel or separation distance, see the type docs.
    pub distance: f32,
    /// Contact position on the hit surface, in world space.
    pub position: Vec3,
    /// Surface normal at the contact, pointing away from the hit body.
    pub normal: Vec3,
    /// Resolved surface properties of the hit body.
    pub surface: SurfaceInfo,
}

impl QueryHit {
    pub fn new(entity: Entity, distance: f32, position: Vec3, normal: Vec3) -> Self {
        Self {
            entity,
            distance,
            position,
            normal,
            surface: SurfaceInfo::default(),
        }
    }

    pub fn with_surface(mut self, surface: SurfaceInfo) -> Self {
        self.surface = surface;
        self
    }
}

/// Result of projecting a point onto nearby geometry.
#[derive(Debug, Clone, Copy)]
pub struct PointProjection {
    /// Body owning the closest surface.
    pub entity: Entity,
    /// Closest point on that surface, in world space.
    pub point: Vec3,
    /// Distance from the query point to the surface.
    pub distance: f32,
    /// Whether the query point lies inside the body's volume.
    pub is_inside: bool,
    /// Resolved surface properties.
    pub surface: SurfaceInfo,
}

/// The ground contact currently supporting a character.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct GroundHit {
    pub entity: Entity,
    /// Contact position on the ground surface.
    pub position: Vec3,
    /// Ground surface normal.
    pub normal: Vec3,
    pub surface: SurfaceInfo,
}

impl GroundHit {
    pub fn from_query(hit: &QueryHit) -> Self {
        Self {
            entity: hit.entity,
            position: hit.position,
            normal: hit.normal,
            surface: hit.surface,
        }
    }
}

/// A hit recorded for velocity projection.
///
/// The per-tick sequence of these, ordered oldest to newest, is the
/// authoritative input of the velocity projector.
#[derive(Debug, Clone, Copy)]
pub struct VelocityProjectionHit {
    pub entity: Entity,
    pub position: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceInfo,
    /// Whether the grounding evaluator considered the character grounded on
    /// this plane when it was recorded.
    pub grounded: bool,
}

impl VelocityProjectionHit {
    pub fn from_query(hit: &QueryHit, grounded: bool) -> Self {
        Self {
            entity: hit.entity,
            position: hit.position,
            normal: hit.normal,
            surface: hit.surface,
            grounded,
        }
    }

    pub fn to_ground_hit(&self) -> GroundHit {
        GroundHit {
            entity: self.entity,
            position: self.position,
            normal: self.normal,
            surface: self.surface,
        }
    }
}

/// A movement hit enriched with the velocity change it caused, kept for the
/// stateful enter/stay/exit event stream.
#[derive(Debug, Clone, Copy)]
pub struct CharacterHit {
    pub entity: Entity,
    pub position: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceInfo,
    /// Whether the character was grounded on this hit.
    pub grounded: bool,
    /// Character velocity when the hit was registered.
    pub velocity_before: Vec3,
    /// Character velocity after projection against the accumulated planes.
    pub velocity_after: Vec3,
}

/// Contact data remembered across ticks so exit events can report the last
/// known contact.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct PreviousHit {
    pub entity: Entity,
    pub position: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceInfo,
}

/// Scratch buffers reused across characters within a tick.
///
/// Cleared (not reallocated) for each character update, so steady-state
/// ticks perform no heap allocation. Owned by the tick, never by an actor.
#[derive(Resource, Default)]
pub struct TickBuffers {
    /// Collider-cast results, ordered by distance.
    pub cast_hits: Vec<QueryHit>,
    /// Distance-query results.
    pub distance_hits: Vec<QueryHit>,
    /// Secondary cast results used by step probing.
    pub probe_hits: Vec<QueryHit>,
    /// Planes accumulated for velocity projection, oldest first.
    pub projection_hits: Vec<VelocityProjectionHit>,
    /// Hits kept for the enter/stay/exit event stream, oldest first.
    pub character_hits: Vec<CharacterHit>,
}

impl TickBuffers {
    /// Reset the per-character accumulators at the start of an update.
    pub fn reset(&mut self) {
        self.cast_hits.clear();
        self.distance_hits.clear();
        self.probe_hits.clear();
        self.projection_hits.clear();
        self.character_hits.clear();
    }
}
