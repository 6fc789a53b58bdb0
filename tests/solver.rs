//! Integration tests for the movement solver.
//!
//! Each test builds a minimal Bevy app with the analytic fixture backend
//! and proves behavior through explicit position/velocity checks.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use kinematic_character_controller::prelude::*;

const DT: f32 = 0.02;
const PLATFORM_TAG: u32 = 0b100;

/// Create a minimal test app driven at exactly one 50 Hz fixed tick per
/// `App::update`.
fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(KinematicCharacterPlugin::<FixtureBackend>::default());
    app.insert_resource(Time::<Fixed>::from_hz(50.0));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(20)));
    app.finish();
    app.cleanup();
    // First update initializes the clock with a zero delta.
    app.update();
    app
}

fn tick(app: &mut App) {
    app.update();
}

fn run_ticks(app: &mut App, count: usize) {
    for _ in 0..count {
        tick(app);
    }
}

fn spawn_character(app: &mut App, feet: Vec3, config: CharacterConfig) -> Entity {
    app.world_mut()
        .spawn((
            Transform::from_translation(feet),
            KinematicCharacterBundle {
                config,
                ..Default::default()
            },
        ))
        .id()
}

fn body(app: &App, entity: Entity) -> &CharacterBody {
    app.world().get::<CharacterBody>(entity).unwrap()
}

fn feet(app: &App, entity: Entity) -> Vec3 {
    app.world().get::<Transform>(entity).unwrap().translation
}

fn set_move(app: &mut App, entity: Entity, axes: Vec2) {
    let mut input = app.world_mut().get_mut::<MoveInput>(entity).unwrap();
    input.set_move(axes);
}

mod flat_ground {
    use super::*;

    #[test]
    fn steady_walk_advances_by_velocity_times_dt() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        // Input scaled so the target ground speed is exactly 2 m/s along +X.
        set_move(&mut app, character, Vec2::new(0.4, 0.0));
        run_ticks(&mut app, 25);

        // PROOF: settled at the target velocity, grounded on the floor.
        let settled = body(&app, character);
        assert!(settled.is_grounded);
        assert!(
            (settled.relative_velocity - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-3,
            "velocity should settle at (2, 0, 0), got {}",
            settled.relative_velocity
        );

        // PROOF: one tick advances the position by velocity * dt.
        let before = feet(&app, character);
        tick(&mut app);
        let after = feet(&app, character);
        assert!(
            ((after.x - before.x) - 2.0 * DT).abs() < 1e-4,
            "expected 0.04 m of travel, got {}",
            after.x - before.x
        );
        assert!((after.y - before.y).abs() < 1e-4, "no vertical drift on flat ground");
        assert!(body(&app, character).is_grounded);
    }

    #[test]
    fn falling_character_lands_and_grounds_once() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let character = spawn_character(&mut app, Vec3::new(0.0, 1.0, 0.0), CharacterConfig::default());

        let mut became_grounded_ticks = 0;
        for _ in 0..60 {
            tick(&mut app);
            let b = body(&app, character);
            // PROOF: the grounding-change accessors are never both true.
            assert!(
                !(b.has_become_grounded() && b.has_become_ungrounded()),
                "grounding accessors must be mutually exclusive"
            );
            if b.has_become_grounded() {
                became_grounded_ticks += 1;
            }
        }

        let landed = body(&app, character);
        assert!(landed.is_grounded, "character should have landed");
        assert_eq!(became_grounded_ticks, 1, "landing happens exactly once");
        assert!(feet(&app, character).y.abs() < 0.05, "feet rest on the floor plane");
        assert!(
            landed.relative_velocity.y.abs() < 1e-3,
            "fall speed is absorbed by the landing"
        );
    }
}

mod obstructions {
    use super::*;

    #[test]
    fn wall_removes_only_the_blocked_velocity_component() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_X).at(Vec3::new(1.0, 0.0, 0.0)));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        // Diagonal input toward the wall: +X is blocked, +Z is free.
        set_move(&mut app, character, Vec2::new(0.7, -0.7));
        run_ticks(&mut app, 100);

        let b = body(&app, character);
        // PROOF: the into-wall component is projected away, the lateral one
        // survives at full speed.
        assert!(
            b.relative_velocity.x.abs() < 0.01,
            "into-wall velocity should be ~0, got {}",
            b.relative_velocity.x
        );
        assert!(
            b.relative_velocity.z > 3.0,
            "along-wall velocity should be preserved, got {}",
            b.relative_velocity.z
        );

        // PROOF: the capsule never penetrates the wall plane.
        let position = feet(&app, character);
        let radius = CharacterConfig::default().standing.radius;
        assert!(
            position.x <= 1.0 - radius + 0.01,
            "capsule surface stays outside the wall, feet at x={}",
            position.x
        );
    }

    #[test]
    fn corner_of_two_walls_zeroes_velocity() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_X).at(Vec3::new(1.0, 0.0, 0.0)));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_Z).at(Vec3::new(0.0, 0.0, 1.0)));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        // Drive straight into the corner.
        set_move(&mut app, character, Vec2::new(0.7, -0.7));
        run_ticks(&mut app, 100);

        let b = body(&app, character);
        // PROOF: a grounded two-wall corner stops movement entirely.
        assert!(
            b.relative_velocity.length() < 1e-3,
            "corner should zero the velocity, got {}",
            b.relative_velocity
        );
        let position = feet(&app, character);
        let radius = CharacterConfig::default().standing.radius;
        assert!(position.x <= 1.0 - radius + 0.01);
        assert!(position.z <= 1.0 - radius + 0.01);
    }

    #[test]
    fn iteration_budget_terminates_with_discard_fallback() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_X).at(Vec3::new(1.0, 0.0, 0.0)));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_Z).at(Vec3::new(0.0, 0.0, 1.0)));

        // A single movement iteration cannot resolve a corner; the discard
        // fallback must keep the tick bounded and the capsule outside the
        // geometry.
        let config = CharacterConfig::default().with_iteration_budget(1, 1, true, false);
        let character = spawn_character(&mut app, Vec3::ZERO, config);

        set_move(&mut app, character, Vec2::new(0.7, -0.7));
        run_ticks(&mut app, 100);

        let position = feet(&app, character);
        let radius = CharacterConfig::default().standing.radius;
        assert!(position.x <= 1.0 - radius + 0.01);
        assert!(position.z <= 1.0 - radius + 0.01);
    }
}

mod steps {
    use super::*;

    #[test]
    fn low_step_is_climbed_without_blocking() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        // A 0.3 m step: below the default 0.35 m max step height. The top
        // extends to x=11 so the character stays on it for the whole run.
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(5.0, 0.15, 2.0)).at(Vec3::new(6.0, 0.15, 0.0)),
        );
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        set_move(&mut app, character, Vec2::new(1.0, 0.0));
        run_ticks(&mut app, 60);

        let position = feet(&app, character);
        let b = body(&app, character);
        // PROOF: the character ended up on top of the step, still moving.
        assert!(
            position.y > 0.25,
            "feet should be elevated by the step height, got y={}",
            position.y
        );
        assert!(
            position.x > 2.0,
            "step should not halt forward progress, got x={}",
            position.x
        );
        assert!(b.is_grounded, "character stands on the step surface");
    }

    #[test]
    fn tall_wall_is_not_stepped() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        // Same footprint, but 1.2 m tall.
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(0.5, 0.6, 2.0)).at(Vec3::new(1.5, 0.6, 0.0)),
        );
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        set_move(&mut app, character, Vec2::new(1.0, 0.0));
        run_ticks(&mut app, 150);

        let position = feet(&app, character);
        assert!(position.y < 0.1, "no elevation against a tall wall");
        let radius = CharacterConfig::default().standing.radius;
        assert!(position.x <= 1.0 - radius + 0.01, "blocked at the wall face");
    }
}

mod moving_platforms {
    use super::*;

    fn platform_config() -> CharacterConfig {
        CharacterConfig::default().with_surface_tags(0, 0, PLATFORM_TAG)
    }

    #[test]
    fn character_rides_a_moving_platform() {
        let mut app = create_test_app();
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(2.5, 0.3, 2.5))
                .at(Vec3::new(0.0, -0.3, 0.0))
                .with_tags(PLATFORM_TAG)
                .with_velocity(Vec3::new(1.0, 0.0, 0.0)),
        );
        let character = spawn_character(&mut app, Vec3::new(0.0, 0.5, 0.0), platform_config());

        // Land and settle relative to the platform.
        run_ticks(&mut app, 30);
        assert!(body(&app, character).is_grounded);
        assert!(body(&app, character).parent.is_some(), "platform becomes the parent");

        // PROOF: with no input, the character is carried at platform speed.
        let before = feet(&app, character).x;
        run_ticks(&mut app, 50);
        let carried = feet(&app, character).x - before;
        assert!(
            (carried - 1.0 * 50.0 * DT).abs() < 0.15,
            "expected ~1.0 m of carry, got {carried}"
        );
    }

    #[test]
    fn jumping_off_keeps_the_platform_momentum() {
        let mut app = create_test_app();
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(2.5, 0.3, 2.5))
                .at(Vec3::new(0.0, -0.3, 0.0))
                .with_tags(PLATFORM_TAG)
                .with_velocity(Vec3::new(1.0, 0.0, 0.0)),
        );
        let character = spawn_character(&mut app, Vec3::new(0.0, 0.5, 0.0), platform_config());
        run_ticks(&mut app, 40);
        assert!(body(&app, character).parent.is_some());

        {
            let mut input = app.world_mut().get_mut::<MoveInput>(character).unwrap();
            input.jump_pressed = true;
        }
        tick(&mut app);
        {
            let mut input = app.world_mut().get_mut::<MoveInput>(character).unwrap();
            input.jump_pressed = false;
        }
        run_ticks(&mut app, 3);

        let b = body(&app, character);
        // PROOF: detaching absorbed the platform velocity instantly; the
        // airborne character keeps drifting at platform speed.
        assert!(b.parent.is_none(), "jump detaches from the platform");
        assert!(!b.is_grounded);
        assert!(
            (b.relative_velocity.x - 1.0).abs() < 0.1,
            "platform momentum should be absorbed, got vx={}",
            b.relative_velocity.x
        );
        assert!(b.relative_velocity.y > 3.0, "jump impulse applied");
    }
}

mod dynamic_bodies {
    use super::*;

    #[test]
    fn walking_into_a_dynamic_body_queues_a_deferred_push() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let crate_entity = app
            .world_mut()
            .spawn(FixtureCollider::cuboid(Vec3::splat(0.5)).at(Vec3::new(2.0, 0.5, 0.0)).dynamic(20.0))
            .id();
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        set_move(&mut app, character, Vec2::new(1.0, 0.0));
        run_ticks(&mut app, 60);

        // PROOF: the impulse pass ran (queue drained) and accelerated the
        // dynamic body away from the character.
        assert!(app.world().resource::<DeferredImpulseQueue>().is_empty());
        let pushed = app.world().get::<FixtureCollider>(crate_entity).unwrap();
        assert!(
            pushed.velocity.x > 0.5,
            "dynamic body should be pushed along +X, got {}",
            pushed.velocity.x
        );
    }
}

mod hit_events {
    use super::*;

    #[derive(Resource, Default)]
    struct HitLog(Vec<(Entity, HitPhase)>);

    fn log_hits(mut log: ResMut<HitLog>, mut events: EventReader<CharacterHitEvent>) {
        for event in events.read() {
            log.0.push((event.other, event.phase));
        }
    }

    #[test]
    fn wall_contact_produces_enter_stay_exit() {
        let mut app = create_test_app();
        app.init_resource::<HitLog>();
        app.add_systems(Update, log_hits);

        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let wall = app
            .world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_X).at(Vec3::new(1.0, 0.0, 0.0)))
            .id();
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        set_move(&mut app, character, Vec2::new(1.0, 0.0));
        run_ticks(&mut app, 60);
        set_move(&mut app, character, Vec2::new(-1.0, 0.0));
        run_ticks(&mut app, 30);

        let log = app.world().resource::<HitLog>();
        let wall_phases: Vec<HitPhase> = log
            .0
            .iter()
            .filter(|(entity, _)| *entity == wall)
            .map(|(_, phase)| *phase)
            .collect();

        // PROOF: the contact lifecycle starts with Enter, continues with
        // Stay while pressing, and ends with Exit after walking away.
        assert_eq!(wall_phases.first(), Some(&HitPhase::Enter));
        assert!(wall_phases.contains(&HitPhase::Stay));
        assert_eq!(wall_phases.last(), Some(&HitPhase::Exit));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_at_creation() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));

        let mut config = CharacterConfig::default();
        config.mass = f32::NAN;
        let character = spawn_character(&mut app, Vec3::ZERO, config);

        tick(&mut app);

        // PROOF: the actor never ticks; its body was removed at creation.
        assert!(app.world().get::<CharacterBody>(character).is_none());
    }

    #[test]
    fn presentation_transform_tracks_the_simulation() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());

        set_move(&mut app, character, Vec2::new(1.0, 0.0));
        run_ticks(&mut app, 50);

        let simulation = feet(&app, character);
        let interpolation = app
            .world()
            .get::<TransformInterpolation>(character)
            .unwrap();
        let presentation = app
            .world()
            .get::<PresentationTransform>(character)
            .unwrap();

        // PROOF: the presentation position lies on the segment between the
        // previous and current fixed-tick positions, and the variable-rate
        // pass never writes the simulation transform.
        let to_presentation = presentation.translation - interpolation.start_translation;
        let segment = interpolation.end_translation - interpolation.start_translation;
        assert!(
            to_presentation.length() <= segment.length() + 1e-4,
            "presentation must not extrapolate past the current tick"
        );
        assert_eq!(interpolation.end_translation, simulation);
    }
}
