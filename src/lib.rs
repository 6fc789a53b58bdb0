//! # `kinematic_character_controller`
//!
//! A kinematic capsule character controller with physics backend
//! abstraction.
//!
//! This crate moves a capsule-shaped actor through a dynamic world using
//! discrete per-tick collision queries instead of rigid-body dynamics:
//! - Iterative collide-and-slide movement with crease and corner aware
//!   velocity projection
//! - Grounding with slope limits, step traversal and ground snapping
//! - Overlap decollision and deferred impulses against dynamic bodies
//! - Moving-platform parenting with momentum hand-off
//! - A locomotion state machine: ground movement, crouching, airborne
//!   movement, swimming, climbing and a non-colliding god mode
//! - Presentation-rate transform interpolation and facing smoothing
//!
//! ## Architecture
//!
//! The controller is generic over a [`CollisionBackend`](backend::CollisionBackend)
//! that provides collider casts, distance queries and body introspection, so
//! physics engines can be swapped. A `bevy_rapier3d` backend ships behind
//! the `rapier3d` feature; an analytic fixture world behind
//! `fixture-backend` backs the integration tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use kinematic_character_controller::prelude::*;
//!
//! # struct MyBackend;
//! # impl kinematic_character_controller::backend::CollisionBackend for MyBackend {
//! #     fn plugin() -> impl Plugin { kinematic_character_controller::backend::NoOpBackendPlugin }
//! #     fn cast_collider(_: &mut World, _: &kinematic_character_controller::config::CapsuleGeometry, _: Vec3, _: Quat, _: Vec3, _: f32, _: &kinematic_character_controller::backend::CollisionFilter, _: &mut Vec<kinematic_character_controller::collision::QueryHit>) {}
//! #     fn calculate_distance(_: &mut World, _: &kinematic_character_controller::config::CapsuleGeometry, _: Vec3, _: Quat, _: f32, _: &kinematic_character_controller::backend::CollisionFilter, _: &mut Vec<kinematic_character_controller::collision::QueryHit>) {}
//! #     fn point_distance(_: &mut World, _: Vec3, _: f32, _: &kinematic_character_controller::backend::CollisionFilter) -> Option<kinematic_character_controller::collision::PointProjection> { None }
//! #     fn body_transform(_: &World, _: Entity) -> Option<(Vec3, Quat)> { None }
//! #     fn body_velocity(_: &World, _: Entity) -> Vec3 { Vec3::ZERO }
//! #     fn apply_impulse(_: &mut World, _: &kinematic_character_controller::impulse::DeferredImpulse) {}
//! # }
//! App::new()
//!     .add_plugins(MinimalPlugins)
//!     .add_plugins(KinematicCharacterPlugin::<MyBackend>::default())
//!     .run();
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod body;
pub mod collision;
pub mod config;
pub mod events;
pub mod grounding;
pub mod impulse;
pub mod input;
pub mod interpolate;
pub mod math;
pub mod projection;
pub mod solver;
pub mod states;

#[cfg(feature = "fixture-backend")]
pub mod fixture;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{CollisionBackend, CollisionFilter};
    pub use crate::body::{CharacterBody, ParentLink, ReplicationState};
    pub use crate::collision::{CollisionResponse, GroundHit, QueryHit, SurfaceInfo};
    pub use crate::config::{CapsuleGeometry, CharacterConfig, ConfigError, Stance};
    pub use crate::events::{CharacterHitEvent, HitPhase, StateTransitionEvent, TransitionPhase};
    pub use crate::impulse::{DeferredImpulse, DeferredImpulseQueue};
    pub use crate::input::MoveInput;
    pub use crate::interpolate::{PresentationTransform, TransformInterpolation};
    pub use crate::states::{CameraParams, CharacterStateMachine, LocomotionState, StateTag};
    pub use crate::{CharacterSystemSet, KinematicCharacterBundle, KinematicCharacterPlugin};

    #[cfg(feature = "fixture-backend")]
    pub use crate::fixture::{FixtureBackend, FixtureCollider, FixtureShape};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, SurfaceTags};
}

use backend::CollisionBackend;
use body::CharacterBody;
use collision::TickBuffers;
use config::CharacterConfig;
use events::{CharacterHitEvent, StateTransitionEvent};
use impulse::DeferredImpulseQueue;
use input::MoveInput;
use interpolate::{PresentationTransform, TransformInterpolation};
use states::CharacterStateMachine;

/// Phases of the fixed-rate character update, chained in order.
///
/// `Solve` is the per-actor primary update: within it no actor writes to
/// another body. Everything cross-actor is queued and applied in
/// `ApplyImpulses`, strictly after every actor has solved.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterSystemSet {
    /// Creation-time config validation.
    Validate,
    /// Interpolation bookkeeping and backend pre-solve work (platform
    /// motion).
    BeginTick,
    /// The per-actor solve pass.
    Solve,
    /// Deferred impulse application.
    ApplyImpulses,
    /// Post-solve bookkeeping.
    EndTick,
}

/// Everything a character actor needs besides a `Transform`.
#[derive(Bundle, Default)]
pub struct KinematicCharacterBundle {
    pub body: CharacterBody,
    pub config: CharacterConfig,
    pub state_machine: CharacterStateMachine,
    pub input: MoveInput,
    pub interpolation: TransformInterpolation,
    pub presentation: PresentationTransform,
}

/// Main plugin for the character controller.
///
/// Generic over the collision backend `B`, which contributes its own
/// systems through [`CollisionBackend::plugin`].
pub struct KinematicCharacterPlugin<B: CollisionBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: CollisionBackend> Default for KinematicCharacterPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: CollisionBackend> Plugin for KinematicCharacterPlugin<B> {
    fn build(&self, app: &mut App) {
        app.register_type::<CharacterBody>();
        app.register_type::<CharacterConfig>();
        app.register_type::<CharacterStateMachine>();
        app.register_type::<MoveInput>();
        app.register_type::<TransformInterpolation>();
        app.register_type::<PresentationTransform>();

        app.init_resource::<TickBuffers>();
        app.init_resource::<DeferredImpulseQueue>();
        app.add_event::<CharacterHitEvent>();
        app.add_event::<StateTransitionEvent>();

        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                CharacterSystemSet::Validate,
                CharacterSystemSet::BeginTick,
                CharacterSystemSet::Solve,
                CharacterSystemSet::ApplyImpulses,
                CharacterSystemSet::EndTick,
            )
                .chain(),
        );
        app.add_systems(
            FixedUpdate,
            (
                config::validate_new_characters.in_set(CharacterSystemSet::Validate),
                (
                    interpolate::initialize_interpolation,
                    interpolate::begin_interpolation_tick,
                )
                    .chain()
                    .in_set(CharacterSystemSet::BeginTick),
                solver::update_characters::<B>.in_set(CharacterSystemSet::Solve),
                impulse::apply_deferred_impulses::<B>.in_set(CharacterSystemSet::ApplyImpulses),
                interpolate::end_interpolation_tick.in_set(CharacterSystemSet::EndTick),
            ),
        );

        app.add_systems(Update, interpolate::interpolate_presentation);
    }
}
