//! Player input component.
//!
//! The game writes raw input here; the controller reads it. How the raw
//! values are produced (keyboard, gamepad, AI, replay) is the caller's
//! business. Each locomotion state maps the raw axes and camera orientation
//! to a world-space move vector its own way; see
//! [`LocomotionState::move_vector`](crate::states::LocomotionState::move_vector).

use bevy::prelude::*;

/// Raw movement input plus the camera orientation needed to interpret it.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct MoveInput {
    /// Planar move axes: `x` strafes right, `y` moves forward. Clamped to
    /// the unit disk by [`MoveInput::set_move`].
    pub move_axes: Vec2,
    /// Orientation of the camera the axes are relative to.
    pub camera_rotation: Quat,
    /// Sprint modifier held.
    pub sprint_held: bool,
    /// Jump was pressed this frame (edge, not level).
    pub jump_pressed: bool,
    /// Jump is held, used for vertical swim/fly input.
    pub jump_held: bool,
    /// Crouch was pressed this frame.
    pub crouch_pressed: bool,
    /// Crouch is held, used for vertical swim/fly input and staying crouched.
    pub crouch_held: bool,
    /// Climb was pressed this frame.
    pub climb_pressed: bool,
    /// God-mode toggle was pressed this frame.
    pub god_toggle_pressed: bool,
}

impl Default for MoveInput {
    fn default() -> Self {
        Self {
            move_axes: Vec2::ZERO,
            camera_rotation: Quat::IDENTITY,
            sprint_held: false,
            jump_pressed: false,
            jump_held: false,
            crouch_pressed: false,
            crouch_held: false,
            climb_pressed: false,
            god_toggle_pressed: false,
        }
    }
}

impl MoveInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the planar move axes, clamped to the unit disk.
    pub fn set_move(&mut self, axes: Vec2) {
        self.move_axes = axes.clamp_length_max(1.0);
    }

    /// Whether any planar movement is requested.
    pub fn is_moving(&self) -> bool {
        self.move_axes.length_squared() > 1e-6
    }

    /// Vertical axis derived from jump/crouch holds: `+1` up, `-1` down.
    pub fn vertical_axis(&self) -> f32 {
        let mut axis = 0.0;
        if self.jump_held {
            axis += 1.0;
        }
        if self.crouch_held {
            axis -= 1.0;
        }
        axis
    }

    /// Clear the per-frame edge flags. The game calls this after the fixed
    /// schedule has consumed them, or simply rewrites the component every
    /// frame.
    pub fn clear_presses(&mut self) {
        self.jump_pressed = false;
        self.crouch_pressed = false;
        self.climb_pressed = false;
        self.god_toggle_pressed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_move_clamps_to_unit_disk() {
        let mut input = MoveInput::new();
        input.set_move(Vec2::new(3.0, 4.0));
        assert!((input.move_axes.length() - 1.0).abs() < 1e-6);

        input.set_move(Vec2::new(0.3, 0.0));
        assert_eq!(input.move_axes, Vec2::new(0.3, 0.0));
    }

    #[test]
    fn vertical_axis_combines_holds() {
        let mut input = MoveInput::new();
        assert_eq!(input.vertical_axis(), 0.0);

        input.jump_held = true;
        assert_eq!(input.vertical_axis(), 1.0);

        input.crouch_held = true;
        assert_eq!(input.vertical_axis(), 0.0);

        input.jump_held = false;
        assert_eq!(input.vertical_axis(), -1.0);
    }

    #[test]
    fn clear_presses_keeps_holds() {
        let mut input = MoveInput::new();
        input.jump_pressed = true;
        input.jump_held = true;
        input.god_toggle_pressed = true;

        input.clear_presses();
        assert!(!input.jump_pressed);
        assert!(!input.god_toggle_pressed);
        assert!(input.jump_held);
    }
}
