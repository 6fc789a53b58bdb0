//! Character configuration.
//!
//! Per-actor tunables supplied at creation time: grounding tolerances,
//! iteration budgets, stance geometry, and the locomotion parameters the
//! states read. Invalid configurations are rejected when the actor is
//! created, never during a tick.

use bevy::prelude::*;
use thiserror::Error;

use crate::body::CharacterBody;

/// Capsule dimensions for one stance.
///
/// `height` is the full end-to-end height including both caps, so it must be
/// at least `2 * radius`. Characters are anchored at the capsule bottom
/// (the feet), so shrinking the capsule keeps the feet in place.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CapsuleGeometry {
    pub radius: f32,
    pub height: f32,
}

impl CapsuleGeometry {
    pub fn new(radius: f32, height: f32) -> Self {
        Self { radius, height }
    }

    /// Half-length of the capsule's inner segment.
    #[inline]
    pub fn half_segment(&self) -> f32 {
        (self.height * 0.5 - self.radius).max(0.0)
    }

    /// Offset from the feet anchor to the capsule center, along local up.
    #[inline]
    pub fn center_offset(&self) -> f32 {
        self.height * 0.5
    }
}

/// The collider stance a character is currently using.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Stance {
    #[default]
    Standing,
    Crouching,
    Swimming,
    Climbing,
}

/// Reasons a [`CharacterConfig`] is rejected at actor creation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max slope angle {0} rad is outside [0, pi)")]
    SlopeAngleOutOfRange(f32),
    #[error("`{0}` must be finite")]
    NonFinite(&'static str),
    #[error("`{0}` must be positive")]
    NonPositive(&'static str),
    #[error("`{0}` must not be negative")]
    Negative(&'static str),
    #[error("`{0}` iteration budget must be at least 1")]
    ZeroIterationBudget(&'static str),
    #[error("{stance:?} capsule height {height} is smaller than twice its radius {radius}")]
    CapsuleTooShort {
        stance: Stance,
        radius: f32,
        height: f32,
    },
    #[error("crouching capsule is taller than the standing capsule")]
    CrouchTallerThanStanding,
}

/// All per-actor tunables of the character controller.
///
/// Immutable during simulation; runtime state lives in
/// [`CharacterBody`](crate::body::CharacterBody).
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacterConfig {
    // === Grounding ===
    /// Steepest walkable slope, in radians from horizontal.
    pub max_slope_angle: f32,
    /// Whether to snap down to nearby ground while grounded.
    pub snap_to_ground: bool,
    /// How far below the feet the ground probe reaches when snapping.
    pub ground_snap_distance: f32,
    /// Deny grounding when the surface ahead falls away sharply, so the
    /// character launches off convex ledges instead of sticking to them.
    pub prevent_grounding_on_future_slope_change: bool,
    /// Slope change, in radians, beyond which lookahead denies grounding.
    pub max_future_slope_change_angle: f32,

    // === Step handling ===
    /// Whether low obstructions are traversed instead of blocking.
    pub step_handling: bool,
    /// Tallest obstruction treated as a step.
    pub max_step_height: f32,
    /// How far past an obstruction the elevated step probe reaches.
    pub step_forward_distance: f32,

    // === Collision solving ===
    /// Skin distance kept between the capsule and geometry.
    pub collision_margin: f32,
    /// Sweep iterations per tick before the exhaustion fallback applies.
    pub max_movement_iterations: u32,
    /// Overlap resolution iterations per tick.
    pub max_decollision_iterations: u32,
    /// On iteration exhaustion, drop whatever movement remains.
    pub discard_movement_when_exceeded: bool,
    /// On iteration exhaustion, also zero the velocity.
    pub zero_velocity_when_exceeded: bool,

    // === Dynamic body interaction ===
    /// Mass used when exchanging momentum with dynamic bodies.
    pub mass: f32,
    /// Whether hitting or standing on dynamic bodies queues impulses on them.
    pub push_dynamic_bodies: bool,
    /// Collision group (memberships, filters) pair passed to the backend.
    pub collision_groups: Option<(u32, u32)>,

    // === Surface tags ===
    /// Tag bits marking water volumes.
    pub water_tags: u32,
    /// Tag bits marking climbable surfaces.
    pub climbable_tags: u32,
    /// Tag bits marking surfaces that act as moving-platform parents.
    pub parent_tags: u32,

    // === Stance geometry ===
    pub standing: CapsuleGeometry,
    pub crouching: CapsuleGeometry,
    pub swimming: CapsuleGeometry,
    pub climbing: CapsuleGeometry,

    // === Ground movement ===
    pub gravity: Vec3,
    pub ground_speed: f32,
    pub sprint_speed: f32,
    pub crouch_speed: f32,
    pub ground_acceleration: f32,
    /// Drag applied while grounded with no input.
    pub ground_friction_sharpness: f32,

    // === Air movement ===
    pub air_speed: f32,
    pub air_acceleration: f32,
    /// Horizontal drag applied while airborne.
    pub air_drag_sharpness: f32,
    pub jump_speed: f32,
    /// Grace period after leaving ground during which a jump still fires.
    pub coyote_time: f32,
    /// How long a jump press stays buffered before landing.
    pub jump_buffer_time: f32,

    // === Swimming ===
    pub swim_speed: f32,
    pub swim_acceleration: f32,
    pub swim_drag_sharpness: f32,
    /// Immersion probe height as a fraction of the swimming capsule height,
    /// measured up from the feet. The character counts as in water while
    /// this point is inside a water volume.
    pub swim_probe_ratio: f32,

    // === Climbing ===
    pub climb_speed: f32,
    pub climb_sharpness: f32,
    /// Reach of the grip probe toward the climbed surface.
    pub climb_grip_distance: f32,

    // === God mode ===
    pub god_speed: f32,
    pub god_sharpness: f32,

    // === Presentation ===
    /// Facing smoothing rate for the variable-rate pass.
    pub rotation_sharpness: f32,
    pub standing_eye_height: f32,
    pub crouching_eye_height: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            // Grounding
            max_slope_angle: 50.0_f32.to_radians(),
            snap_to_ground: true,
            ground_snap_distance: 0.3,
            prevent_grounding_on_future_slope_change: true,
            max_future_slope_change_angle: 40.0_f32.to_radians(),

            // Steps
            step_handling: true,
            max_step_height: 0.35,
            step_forward_distance: 0.05,

            // Collision solving
            collision_margin: 0.02,
            max_movement_iterations: 6,
            max_decollision_iterations: 2,
            discard_movement_when_exceeded: true,
            zero_velocity_when_exceeded: false,

            // Dynamic bodies
            mass: 70.0,
            push_dynamic_bodies: true,
            collision_groups: None,

            // Tags
            water_tags: 0,
            climbable_tags: 0,
            parent_tags: 0,

            // Stances
            standing: CapsuleGeometry::new(0.35, 1.8),
            crouching: CapsuleGeometry::new(0.35, 1.1),
            swimming: CapsuleGeometry::new(0.35, 1.3),
            climbing: CapsuleGeometry::new(0.35, 1.5),

            // Ground movement
            gravity: Vec3::new(0.0, -20.0, 0.0),
            ground_speed: 5.0,
            sprint_speed: 8.0,
            crouch_speed: 2.5,
            ground_acceleration: 40.0,
            ground_friction_sharpness: 12.0,

            // Air movement
            air_speed: 5.0,
            air_acceleration: 12.0,
            air_drag_sharpness: 0.2,
            jump_speed: 7.0,
            coyote_time: 0.15,
            jump_buffer_time: 0.1,

            // Swimming
            swim_speed: 3.0,
            swim_acceleration: 15.0,
            swim_drag_sharpness: 3.0,
            swim_probe_ratio: 0.75,

            // Climbing
            climb_speed: 2.0,
            climb_sharpness: 15.0,
            climb_grip_distance: 0.5,

            // God mode
            god_speed: 12.0,
            god_sharpness: 8.0,

            // Presentation
            rotation_sharpness: 18.0,
            standing_eye_height: 1.65,
            crouching_eye_height: 0.95,
        }
    }
}

impl CharacterConfig {
    /// Capsule geometry for the given stance.
    #[inline]
    pub fn capsule(&self, stance: Stance) -> CapsuleGeometry {
        match stance {
            Stance::Standing => self.standing,
            Stance::Crouching => self.crouching,
            Stance::Swimming => self.swimming,
            Stance::Climbing => self.climbing,
        }
    }

    /// Cosine of the steepest walkable slope; a surface is walkable when
    /// `dot(normal, up)` is at least this value.
    #[inline]
    pub fn min_ground_dot(&self) -> f32 {
        self.max_slope_angle.cos()
    }

    /// Check every tunable against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_slope_angle.is_finite()
            || self.max_slope_angle < 0.0
            || self.max_slope_angle >= std::f32::consts::PI
        {
            return Err(ConfigError::SlopeAngleOutOfRange(self.max_slope_angle));
        }
        if !self.mass.is_finite() {
            return Err(ConfigError::NonFinite("mass"));
        }
        if self.mass <= 0.0 {
            return Err(ConfigError::NonPositive("mass"));
        }
        if !self.collision_margin.is_finite() || self.collision_margin <= 0.0 {
            return Err(ConfigError::NonPositive("collision_margin"));
        }
        if self.max_movement_iterations == 0 {
            return Err(ConfigError::ZeroIterationBudget("max_movement_iterations"));
        }
        if self.max_decollision_iterations == 0 {
            return Err(ConfigError::ZeroIterationBudget("max_decollision_iterations"));
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::NonFinite("gravity"));
        }

        for (field, value) in [
            ("ground_snap_distance", self.ground_snap_distance),
            ("max_step_height", self.max_step_height),
            ("step_forward_distance", self.step_forward_distance),
            ("coyote_time", self.coyote_time),
            ("jump_buffer_time", self.jump_buffer_time),
            ("climb_grip_distance", self.climb_grip_distance),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(field));
            }
            if value < 0.0 {
                return Err(ConfigError::Negative(field));
            }
        }

        for (field, value) in [
            ("ground_speed", self.ground_speed),
            ("sprint_speed", self.sprint_speed),
            ("crouch_speed", self.crouch_speed),
            ("ground_acceleration", self.ground_acceleration),
            ("air_speed", self.air_speed),
            ("air_acceleration", self.air_acceleration),
            ("jump_speed", self.jump_speed),
            ("swim_speed", self.swim_speed),
            ("swim_acceleration", self.swim_acceleration),
            ("climb_speed", self.climb_speed),
            ("god_speed", self.god_speed),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(field));
            }
            if value < 0.0 {
                return Err(ConfigError::Negative(field));
            }
        }

        for stance in [
            Stance::Standing,
            Stance::Crouching,
            Stance::Swimming,
            Stance::Climbing,
        ] {
            let capsule = self.capsule(stance);
            if !capsule.radius.is_finite() || !capsule.height.is_finite() {
                return Err(ConfigError::NonFinite("capsule geometry"));
            }
            if capsule.radius <= 0.0 {
                return Err(ConfigError::NonPositive("capsule radius"));
            }
            if capsule.height < capsule.radius * 2.0 {
                return Err(ConfigError::CapsuleTooShort {
                    stance,
                    radius: capsule.radius,
                    height: capsule.height,
                });
            }
        }
        if self.crouching.height > self.standing.height {
            return Err(ConfigError::CrouchTallerThanStanding);
        }

        Ok(())
    }

    /// Builder: set the standing capsule geometry.
    pub fn with_capsule(mut self, radius: f32, height: f32) -> Self {
        self.standing = CapsuleGeometry::new(radius, height);
        self
    }

    /// Builder: set the steepest walkable slope in radians.
    pub fn with_max_slope_angle(mut self, radians: f32) -> Self {
        self.max_slope_angle = radians;
        self
    }

    /// Builder: set ground and sprint speeds.
    pub fn with_ground_speeds(mut self, walk: f32, sprint: f32) -> Self {
        self.ground_speed = walk;
        self.sprint_speed = sprint;
        self
    }

    /// Builder: set the gravity vector.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Builder: enable or disable step handling.
    pub fn with_step_handling(mut self, enabled: bool, max_height: f32) -> Self {
        self.step_handling = enabled;
        self.max_step_height = max_height;
        self
    }

    /// Builder: set the surface tag masks.
    pub fn with_surface_tags(mut self, water: u32, climbable: u32, parent: u32) -> Self {
        self.water_tags = water;
        self.climbable_tags = climbable;
        self.parent_tags = parent;
        self
    }

    /// Builder: set the iteration budgets and exhaustion fallback.
    pub fn with_iteration_budget(
        mut self,
        movement: u32,
        decollision: u32,
        discard_movement: bool,
        zero_velocity: bool,
    ) -> Self {
        self.max_movement_iterations = movement;
        self.max_decollision_iterations = decollision;
        self.discard_movement_when_exceeded = discard_movement;
        self.zero_velocity_when_exceeded = zero_velocity;
        self
    }
}

/// Reject invalid configurations at actor creation.
///
/// A character whose config fails validation never ticks: its
/// [`CharacterBody`] is removed and the rejection is logged.
pub fn validate_new_characters(
    mut commands: Commands,
    new_characters: Query<(Entity, &CharacterConfig), Added<CharacterConfig>>,
) {
    for (entity, config) in &new_characters {
        if let Err(error) = config.validate() {
            warn!("rejecting character {entity}: {error}");
            commands.entity(entity).remove::<CharacterBody>();
        }
    }
}
