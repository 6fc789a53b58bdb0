//! Events exposed to surrounding systems.
//!
//! The controller reports its per-tick collision contacts as
//! enter/stay/exit events for audio, VFX and animation consumers, and its
//! locomotion state changes for anything that needs to react to them.

use bevy::prelude::*;

use crate::collision::SurfaceInfo;
use crate::states::StateTag;

/// Lifecycle of a contact between a character and another body.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitPhase {
    /// The body was not touched last tick.
    Enter,
    /// The body was touched last tick and still is.
    Stay,
    /// The body was touched last tick and no longer is.
    Exit,
}

/// A stateful collision contact of one character.
///
/// `Exit` events carry the last known contact data from the tick the body
/// was still touched.
#[derive(Event, Debug, Clone, Copy)]
pub struct CharacterHitEvent {
    pub character: Entity,
    pub other: Entity,
    pub phase: HitPhase,
    pub position: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceInfo,
}

/// Which half of a state transition an event reports.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Exited,
    Entered,
}

/// Emitted once per state-machine transition half: the exit of the old
/// state, then the entry of the new one, in that order.
#[derive(Event, Debug, Clone, Copy)]
pub struct StateTransitionEvent {
    pub character: Entity,
    pub phase: TransitionPhase,
    pub state: StateTag,
}
