//! Presentation-rate interpolation.
//!
//! The fixed-rate solver writes the simulation transform; this module keeps
//! the previous/current fixed-tick pair and produces a smoothed
//! presentation transform at render rate. The variable-rate pass is
//! strictly read-only over simulation state: it writes only
//! [`PresentationTransform`].

use bevy::prelude::*;

use crate::body::CharacterBody;
use crate::config::CharacterConfig;
use crate::input::MoveInput;
use crate::math;
use crate::states::CharacterStateMachine;

/// The previous and current fixed-tick transforms of a character.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct TransformInterpolation {
    pub start_translation: Vec3,
    pub start_rotation: Quat,
    pub end_translation: Vec3,
    pub end_rotation: Quat,
}

impl TransformInterpolation {
    pub fn from_transform(transform: &Transform) -> Self {
        Self {
            start_translation: transform.translation,
            start_rotation: transform.rotation,
            end_translation: transform.translation,
            end_rotation: transform.rotation,
        }
    }

    /// Interpolated transform at `alpha` between the two ticks.
    pub fn sample(&self, alpha: f32) -> (Vec3, Quat) {
        let alpha = alpha.clamp(0.0, 1.0);
        (
            self.start_translation.lerp(self.end_translation, alpha),
            self.start_rotation
                .slerp(math::shortest_rotation(self.start_rotation, self.end_rotation), alpha)
                .normalize(),
        )
    }
}

/// Smoothed transform for rendering and other presentation consumers.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct PresentationTransform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for PresentationTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Seed freshly added interpolation components from the spawn transform so
/// the first rendered frames do not sweep in from the origin.
pub fn initialize_interpolation(
    mut query: Query<(&Transform, &mut TransformInterpolation), Added<TransformInterpolation>>,
) {
    for (transform, mut interpolation) in &mut query {
        *interpolation = TransformInterpolation::from_transform(transform);
    }
}

/// Shift the current endpoint into the past at the start of a fixed tick.
pub fn begin_interpolation_tick(mut query: Query<&mut TransformInterpolation>) {
    for mut interpolation in &mut query {
        interpolation.start_translation = interpolation.end_translation;
        interpolation.start_rotation = interpolation.end_rotation;
    }
}

/// Capture the solved transform at the end of a fixed tick.
pub fn end_interpolation_tick(
    mut query: Query<(&Transform, &mut TransformInterpolation), With<CharacterBody>>,
) {
    for (transform, mut interpolation) in &mut query {
        interpolation.end_translation = transform.translation;
        interpolation.end_rotation = transform.rotation;
    }
}

/// Variable-rate pass: interpolate between the fixed-tick pair and smooth
/// the facing the active state asks for.
pub fn interpolate_presentation(
    fixed_time: Res<Time<Fixed>>,
    time: Res<Time>,
    mut query: Query<(
        &TransformInterpolation,
        &CharacterBody,
        &CharacterConfig,
        &CharacterStateMachine,
        &MoveInput,
        &mut PresentationTransform,
    )>,
) {
    let alpha = fixed_time.overstep_fraction();
    let dt = time.delta_secs();

    for (interpolation, body, config, machine, input, mut presentation) in &mut query {
        let (translation, rotation) = interpolation.sample(alpha);
        presentation.translation = translation;

        let target = machine
            .current
            .facing_target(body.world_velocity(), input, body.grounding_up)
            .and_then(|(forward, up)| {
                (forward.length_squared() > math::SQUARED_EPSILON)
                    .then(|| Transform::default().looking_to(forward, up).rotation)
            })
            .unwrap_or(rotation);
        presentation.rotation =
            math::smooth_rotate(presentation.rotation, target, config.rotation_sharpness, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sample_interpolates_translation() {
        let interpolation = TransformInterpolation {
            start_translation: Vec3::ZERO,
            start_rotation: Quat::IDENTITY,
            end_translation: Vec3::new(2.0, 0.0, 0.0),
            end_rotation: Quat::IDENTITY,
        };
        let (translation, _) = interpolation.sample(0.5);
        assert_relative_eq!(translation.x, 1.0);

        let (at_end, _) = interpolation.sample(1.0);
        assert_relative_eq!(at_end.x, 2.0);

        // Out-of-range alpha clamps instead of extrapolating.
        let (clamped, _) = interpolation.sample(1.5);
        assert_relative_eq!(clamped.x, 2.0);
    }

    #[test]
    fn from_transform_pins_both_endpoints() {
        let transform = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let interpolation = TransformInterpolation::from_transform(&transform);
        assert_eq!(interpolation.start_translation, interpolation.end_translation);
        assert_eq!(interpolation.start_translation, transform.translation);
    }
}
