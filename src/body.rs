//! The per-actor character body component.
//!
//! This is the central hub for all runtime state of one character: velocity,
//! grounding, moving-platform linkage, and the per-tick flags the solver
//! phases communicate through. Configuration lives in
//! [`CharacterConfig`](crate::config::CharacterConfig); transient hit
//! buffers live in [`TickBuffers`](crate::collision::TickBuffers).

use bevy::prelude::*;

use crate::collision::{GroundHit, PreviousHit};
use crate::config::Stance;

/// Linkage to a moving-platform parent body.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ParentLink {
    /// The parent body entity.
    pub entity: Entity,
    /// The character's feet position in the parent's local space, captured
    /// when attaching and refreshed after each movement phase.
    pub anchor: Vec3,
    /// The character's rotation relative to the parent.
    pub rotation_from_parent: Quat,
}

/// Runtime state of one character actor.
///
/// Most fields are recomputed every tick. Only the replication subset (see
/// [`ReplicationState`]) needs to persist across network transfer.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct CharacterBody {
    /// Velocity relative to the parent body, in world space. For characters
    /// without a parent this equals the world velocity.
    pub relative_velocity: Vec3,
    /// Whether the grounding evaluator currently considers the character
    /// supported. Set only by the evaluator and by explicit state
    /// transitions.
    pub is_grounded: bool,
    /// Current up direction. Defaults to the character's local up and may
    /// deviate from world up under custom gravity.
    pub grounding_up: Vec3,
    /// The supporting ground contact, when grounded.
    pub ground_hit: Option<GroundHit>,
    /// Collider stance currently in use.
    pub stance: Stance,

    /// Moving-platform linkage, when riding one.
    pub parent: Option<ParentLink>,
    /// The parent's velocity at the character's position, recorded each
    /// tick. Absorbed into `relative_velocity` on detach.
    pub parent_velocity: Vec3,

    /// Grounding state snapshotted at the start of the current update.
    pub was_grounded_before_update: bool,
    /// Delta time of the most recent physics update.
    pub last_physics_delta: f32,
    /// Seconds since the character was last grounded.
    pub time_since_grounded: f32,
    /// Remaining jump-buffer window, armed by a jump press.
    pub jump_buffer: f32,

    /// Set by the slope-change lookahead to deny grounding for the rest of
    /// the tick. Cleared at tick start.
    pub(crate) grounding_suppressed: bool,
    /// Set by states that must not stick to the ground (climbing, swimming).
    /// Restored by the state's exit.
    pub(crate) snapping_suppressed: bool,

    /// Contacts from the previous tick, for enter/stay/exit events.
    #[reflect(ignore)]
    pub(crate) previous_hits: Vec<PreviousHit>,
}

impl Default for CharacterBody {
    fn default() -> Self {
        Self {
            relative_velocity: Vec3::ZERO,
            is_grounded: false,
            grounding_up: Vec3::Y,
            ground_hit: None,
            stance: Stance::Standing,
            parent: None,
            parent_velocity: Vec3::ZERO,
            was_grounded_before_update: false,
            last_physics_delta: 0.0,
            time_since_grounded: f32::MAX,
            jump_buffer: 0.0,
            grounding_suppressed: false,
            snapping_suppressed: false,
            previous_hits: Vec::new(),
        }
    }
}

impl CharacterBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// World-space velocity: relative velocity plus the parent's.
    #[inline]
    pub fn world_velocity(&self) -> Vec3 {
        self.relative_velocity + self.parent_velocity
    }

    /// Whether the character became grounded during the current update.
    #[inline]
    pub fn has_become_grounded(&self) -> bool {
        self.is_grounded && !self.was_grounded_before_update
    }

    /// Whether the character left the ground during the current update.
    #[inline]
    pub fn has_become_ungrounded(&self) -> bool {
        !self.is_grounded && self.was_grounded_before_update
    }

    /// Normal of the current ground contact, or `grounding_up` when
    /// airborne.
    #[inline]
    pub fn ground_normal(&self) -> Vec3 {
        self.ground_hit
            .as_ref()
            .map(|hit| hit.normal)
            .unwrap_or(self.grounding_up)
    }

    /// Drop the current ground contact, e.g. when jumping.
    pub fn unground(&mut self) {
        self.is_grounded = false;
        self.ground_hit = None;
    }

    /// The minimal subset that must survive replication.
    pub fn replication_state(&self) -> ReplicationState {
        ReplicationState {
            relative_velocity: self.relative_velocity,
            is_grounded: self.is_grounded,
            parent: self.parent,
            parent_velocity: self.parent_velocity,
        }
    }

    /// Apply a replicated subset on top of locally recomputed state.
    pub fn apply_replication_state(&mut self, state: &ReplicationState) {
        self.relative_velocity = state.relative_velocity;
        self.is_grounded = state.is_grounded;
        self.parent = state.parent;
        self.parent_velocity = state.parent_velocity;
    }
}

/// The network-relevant subset of [`CharacterBody`], distinct from the
/// larger transient solver state.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicationState {
    pub relative_velocity: Vec3,
    pub is_grounded: bool,
    pub parent: Option<ParentLink>,
    pub parent_velocity: Vec3,
}
