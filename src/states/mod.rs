//! The locomotion state machine.
//!
//! One closed enum over the locomotion modes, dispatched with a `match`;
//! state values carry only the small transient data they need mid-state.
//! Exactly one state is active per actor. On a transition the old state's
//! exit runs to completion before the new state's enter begins, and both
//! may mutate the shared character context (collider stance, ground-snap
//! flags).

pub mod air;
pub mod climb;
pub mod god;
pub mod ground;
pub mod swim;

use bevy::prelude::*;

use crate::backend::CollisionBackend;
use crate::config::CharacterConfig;
use crate::events::{StateTransitionEvent, TransitionPhase};
use crate::input::MoveInput;
use crate::math;
use crate::solver::CharacterContext;

/// Discriminant of a locomotion state, used in events and camera logic.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTag {
    Uninitialized,
    GroundMove,
    Crouched,
    AirMove,
    Swimming,
    Climbing,
    GodMode,
}

/// A locomotion state with its transient data.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum LocomotionState {
    /// Initial sentinel before first activation. The only state with no
    /// enter/exit side effects.
    Uninitialized,
    GroundMove,
    Crouched,
    AirMove,
    Swimming {
        /// Set while the character is no longer immersed.
        should_exit: bool,
    },
    Climbing {
        /// Last known normal of the climbed surface; zero once lost.
        surface_normal: Vec3,
    },
    GodMode,
}

/// Camera parameters a state exposes to the (external) camera rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Eye height above the feet anchor the camera should track.
    pub follow_height: f32,
    /// Whether the camera's up vector should track gravity instead of the
    /// character's own up.
    pub use_gravity_up: bool,
}

impl LocomotionState {
    pub fn tag(&self) -> StateTag {
        match self {
            Self::Uninitialized => StateTag::Uninitialized,
            Self::GroundMove => StateTag::GroundMove,
            Self::Crouched => StateTag::Crouched,
            Self::AirMove => StateTag::AirMove,
            Self::Swimming { .. } => StateTag::Swimming,
            Self::Climbing { .. } => StateTag::Climbing,
            Self::GodMode => StateTag::GodMode,
        }
    }

    /// Run this state's physics update, which drives the solver phases.
    pub fn physics_update<B: CollisionBackend>(
        &mut self,
        world: &mut World,
        ctx: &mut CharacterContext,
    ) {
        match self {
            Self::Uninitialized => {}
            Self::GroundMove => ground::physics_update::<B>(world, ctx, false),
            Self::Crouched => ground::physics_update::<B>(world, ctx, true),
            Self::AirMove => air::physics_update::<B>(world, ctx),
            Self::Swimming { should_exit } => swim::physics_update::<B>(world, ctx, should_exit),
            Self::Climbing { surface_normal } => {
                climb::physics_update::<B>(world, ctx, surface_normal)
            }
            Self::GodMode => god::physics_update(ctx),
        }
    }

    /// Decide whether to leave this state, highest-priority rule first.
    pub fn detect_transitions<B: CollisionBackend>(
        &self,
        world: &mut World,
        ctx: &mut CharacterContext,
    ) -> Option<LocomotionState> {
        match self {
            Self::Uninitialized => None,
            Self::GroundMove => ground::detect_transitions::<B>(world, ctx, false),
            Self::Crouched => ground::detect_transitions::<B>(world, ctx, true),
            Self::AirMove => air::detect_transitions::<B>(world, ctx),
            Self::Swimming { should_exit } => swim::detect_transitions::<B>(world, ctx, *should_exit),
            Self::Climbing { surface_normal } => climb::detect_transitions(ctx, *surface_normal),
            Self::GodMode => god::detect_transitions(ctx),
        }
    }

    pub fn on_enter(&self, ctx: &mut CharacterContext, previous: &LocomotionState) {
        match self {
            Self::Uninitialized => {}
            Self::GroundMove | Self::AirMove => ground::on_enter_default(ctx),
            Self::Crouched => ground::on_enter_crouched(ctx),
            Self::Swimming { .. } => swim::on_enter(ctx),
            Self::Climbing { surface_normal } => climb::on_enter(ctx, *surface_normal),
            Self::GodMode => god::on_enter(ctx, previous),
        }
    }

    pub fn on_exit(&self, ctx: &mut CharacterContext, next: &LocomotionState) {
        match self {
            Self::Uninitialized => {}
            Self::GroundMove | Self::AirMove => {}
            Self::Crouched => ground::on_exit_crouched(ctx),
            Self::Swimming { .. } => swim::on_exit(ctx),
            Self::Climbing { .. } => climb::on_exit(ctx),
            Self::GodMode => god::on_exit(ctx, next),
        }
    }

    /// Camera target parameters for this state.
    pub fn camera_params(&self, config: &CharacterConfig) -> CameraParams {
        match self {
            Self::Uninitialized | Self::GroundMove | Self::AirMove => CameraParams {
                follow_height: config.standing_eye_height,
                use_gravity_up: true,
            },
            Self::Crouched => CameraParams {
                follow_height: config.crouching_eye_height,
                use_gravity_up: true,
            },
            Self::Swimming { .. } => CameraParams {
                follow_height: config.swimming.height * 0.75,
                use_gravity_up: true,
            },
            Self::Climbing { .. } | Self::GodMode => CameraParams {
                follow_height: config.standing_eye_height,
                use_gravity_up: false,
            },
        }
    }

    /// Map raw player input and camera orientation to a world-space move
    /// vector, the way this state interprets movement.
    pub fn move_vector(&self, input: &MoveInput, grounding_up: Vec3) -> Vec3 {
        match self {
            Self::Uninitialized => Vec3::ZERO,
            Self::GroundMove | Self::Crouched | Self::AirMove => {
                planar_move_vector(input, grounding_up)
            }
            Self::Swimming { .. } => free_move_vector(input, grounding_up),
            Self::Climbing { surface_normal } => {
                climb::surface_move_vector(input, grounding_up, *surface_normal)
            }
            Self::GodMode => free_move_vector(input, grounding_up),
        }
    }

    /// Facing the variable-rate pass should smooth toward, as a forward
    /// direction and up axis. `None` keeps the current facing.
    pub fn facing_target(
        &self,
        velocity: Vec3,
        input: &MoveInput,
        grounding_up: Vec3,
    ) -> Option<(Vec3, Vec3)> {
        match self {
            Self::Uninitialized => None,
            Self::GroundMove | Self::Crouched | Self::AirMove | Self::Swimming { .. } => {
                let lateral = math::project_on_plane(velocity, grounding_up);
                if lateral.length_squared() < 0.01 {
                    return None;
                }
                Some((lateral.normalize(), grounding_up))
            }
            Self::Climbing { surface_normal } => {
                if surface_normal.length_squared() < math::SQUARED_EPSILON {
                    return None;
                }
                Some((-*surface_normal, grounding_up))
            }
            Self::GodMode => {
                let forward =
                    math::project_on_plane(input.camera_rotation * Vec3::NEG_Z, grounding_up)
                        .normalize_or_zero();
                (forward != Vec3::ZERO).then_some((forward, grounding_up))
            }
        }
    }
}

/// Camera-relative movement restricted to the plane perpendicular to `up`.
pub(crate) fn planar_move_vector(input: &MoveInput, up: Vec3) -> Vec3 {
    let forward = math::project_on_plane(input.camera_rotation * Vec3::NEG_Z, up).normalize_or_zero();
    let right = math::project_on_plane(input.camera_rotation * Vec3::X, up).normalize_or_zero();
    (right * input.move_axes.x + forward * input.move_axes.y).clamp_length_max(1.0)
}

/// Full three-dimensional camera-relative movement with a vertical axis
/// from the jump/crouch holds.
pub(crate) fn free_move_vector(input: &MoveInput, up: Vec3) -> Vec3 {
    let forward = input.camera_rotation * Vec3::NEG_Z;
    let right = input.camera_rotation * Vec3::X;
    (right * input.move_axes.x + forward * input.move_axes.y + up * input.vertical_axis())
        .clamp_length_max(1.0)
}

/// Transitions any state honors: god-mode toggle and climb acquisition.
pub(crate) fn global_transition<B: CollisionBackend>(
    world: &mut World,
    ctx: &mut CharacterContext,
    current: StateTag,
) -> Option<LocomotionState> {
    if ctx.input.god_toggle_pressed && current != StateTag::GodMode {
        return Some(LocomotionState::GodMode);
    }
    if ctx.input.climb_pressed && current != StateTag::Climbing && current != StateTag::GodMode {
        if let Some(surface_normal) = climb::find_climbable_surface::<B>(world, ctx) {
            return Some(LocomotionState::Climbing { surface_normal });
        }
    }
    None
}

/// The state machine component: the one active state of an actor.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct CharacterStateMachine {
    pub current: LocomotionState,
}

impl Default for CharacterStateMachine {
    fn default() -> Self {
        Self {
            current: LocomotionState::Uninitialized,
        }
    }
}

impl CharacterStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one fixed tick: first activation out of the sentinel, the active
    /// state's physics update, then its transition detection.
    pub fn update<B: CollisionBackend>(&mut self, world: &mut World, ctx: &mut CharacterContext) {
        if matches!(self.current, LocomotionState::Uninitialized) {
            self.transition_to(ctx, LocomotionState::AirMove);
        }
        let mut current = self.current;
        current.physics_update::<B>(world, ctx);
        self.current = current;
        if let Some(next) = self.current.detect_transitions::<B>(world, ctx) {
            self.transition_to(ctx, next);
        }
    }

    /// Switch states: the old state's exit completes before the new state's
    /// enter begins.
    pub fn transition_to(&mut self, ctx: &mut CharacterContext, next: LocomotionState) {
        let old = self.current;
        old.on_exit(ctx, &next);
        ctx.state_events.push(StateTransitionEvent {
            character: ctx.entity,
            phase: TransitionPhase::Exited,
            state: old.tag(),
        });
        self.current = next;
        self.current.on_enter(ctx, &old);
        ctx.state_events.push(StateTransitionEvent {
            character: ctx.entity,
            phase: TransitionPhase::Entered,
            state: self.current.tag(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_cover_every_variant() {
        assert_eq!(LocomotionState::Uninitialized.tag(), StateTag::Uninitialized);
        assert_eq!(LocomotionState::GroundMove.tag(), StateTag::GroundMove);
        assert_eq!(LocomotionState::Crouched.tag(), StateTag::Crouched);
        assert_eq!(LocomotionState::AirMove.tag(), StateTag::AirMove);
        assert_eq!(
            LocomotionState::Swimming { should_exit: false }.tag(),
            StateTag::Swimming
        );
        assert_eq!(
            LocomotionState::Climbing {
                surface_normal: Vec3::X
            }
            .tag(),
            StateTag::Climbing
        );
        assert_eq!(LocomotionState::GodMode.tag(), StateTag::GodMode);
    }

    #[test]
    fn planar_move_vector_stays_horizontal() {
        let mut input = MoveInput::new();
        input.set_move(Vec2::new(0.0, 1.0));
        // Camera pitched 45 degrees down; movement must stay in the plane.
        input.camera_rotation = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_4);

        let v = planar_move_vector(&input, Vec3::Y);
        assert!(v.y.abs() < 1e-6);
        assert!((v.length() - 1.0).abs() < 1e-5);
        assert!(v.z < 0.0, "camera forward is -Z");
    }

    #[test]
    fn free_move_vector_uses_vertical_axis() {
        let mut input = MoveInput::new();
        input.jump_held = true;

        let v = free_move_vector(&input, Vec3::Y);
        assert!((v - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn swimming_maps_vertical_input_to_vertical_movement() {
        let mut input = MoveInput::new();
        input.crouch_held = true;
        let state = LocomotionState::Swimming { should_exit: false };
        let v = state.move_vector(&input, Vec3::Y);
        assert!(v.y < 0.0);
    }

    #[test]
    fn crouched_camera_is_lower_than_standing() {
        let config = CharacterConfig::default();
        let standing = LocomotionState::GroundMove.camera_params(&config);
        let crouched = LocomotionState::Crouched.camera_params(&config);
        assert!(crouched.follow_height < standing.follow_height);
        assert!(standing.use_gravity_up);
    }

    #[test]
    fn climbing_camera_tracks_character_up() {
        let config = CharacterConfig::default();
        let params = LocomotionState::Climbing {
            surface_normal: Vec3::X,
        }
        .camera_params(&config);
        assert!(!params.use_gravity_up);
    }

    #[test]
    fn machine_defaults_to_uninitialized() {
        let machine = CharacterStateMachine::new();
        assert_eq!(machine.current.tag(), StateTag::Uninitialized);
    }
}
