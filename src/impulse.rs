//! Deferred impulses.
//!
//! Characters never write to other bodies during their own update. Any
//! effect on a dynamic body or another character is queued as a
//! [`DeferredImpulse`] and applied in a separate pass once every character
//! has finished its primary update. The two-pass structure removes
//! write-write hazards between characters pushing each other or landing on
//! one another within the same tick.

use bevy::prelude::*;

use crate::backend::CollisionBackend;

/// A velocity or positional change queued for a body.
#[derive(Debug, Clone, Copy)]
pub struct DeferredImpulse {
    /// Body receiving the impulse.
    pub target: Entity,
    /// Linear momentum change (mass times velocity delta).
    pub linear: Vec3,
    /// Angular momentum change.
    pub angular: Vec3,
    /// Direct positional displacement, used when splitting decollision with
    /// a dynamic body.
    pub displacement: Vec3,
    /// World-space application point for the linear part.
    pub point: Vec3,
}

impl DeferredImpulse {
    /// A purely linear impulse applied at a contact point.
    pub fn linear(target: Entity, impulse: Vec3, point: Vec3) -> Self {
        Self {
            target,
            linear: impulse,
            angular: Vec3::ZERO,
            displacement: Vec3::ZERO,
            point,
        }
    }

    /// A pure positional displacement.
    pub fn displacement(target: Entity, displacement: Vec3) -> Self {
        Self {
            target,
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
            displacement,
            point: Vec3::ZERO,
        }
    }
}

/// Queue of impulses produced during the solve pass of the current tick.
#[derive(Resource, Default)]
pub struct DeferredImpulseQueue {
    pub(crate) pending: Vec<DeferredImpulse>,
}

impl DeferredImpulseQueue {
    pub fn push(&mut self, impulse: DeferredImpulse) {
        self.pending.push(impulse);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Drain the queue and hand every impulse to the backend.
///
/// Runs strictly after the character solve pass.
pub fn apply_deferred_impulses<B: CollisionBackend>(world: &mut World) {
    let pending = {
        let mut queue = world.resource_mut::<DeferredImpulseQueue>();
        std::mem::take(&mut queue.pending)
    };
    for impulse in &pending {
        B::apply_impulse(world, impulse);
    }
    // Hand the allocation back so steady-state ticks stay allocation-free.
    let mut queue = world.resource_mut::<DeferredImpulseQueue>();
    let mut recycled = pending;
    recycled.clear();
    queue.pending = recycled;
}
