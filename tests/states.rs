//! Integration tests for the locomotion state machine.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use kinematic_character_controller::prelude::*;

const WATER_TAG: u32 = 0b01;
const CLIMB_TAG: u32 = 0b10;

#[derive(Resource, Default)]
struct StateLog(Vec<(TransitionPhase, StateTag)>);

fn log_state_events(mut log: ResMut<StateLog>, mut events: EventReader<StateTransitionEvent>) {
    for event in events.read() {
        log.0.push((event.phase, event.state));
    }
}

fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(KinematicCharacterPlugin::<FixtureBackend>::default());
    app.insert_resource(Time::<Fixed>::from_hz(50.0));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(20)));
    app.init_resource::<StateLog>();
    app.add_systems(Update, log_state_events);
    app.finish();
    app.cleanup();
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

fn current_state(app: &App, entity: Entity) -> StateTag {
    app.world()
        .get::<CharacterStateMachine>(entity)
        .unwrap()
        .current
        .tag()
}

fn body(app: &App, entity: Entity) -> &CharacterBody {
    app.world().get::<CharacterBody>(entity).unwrap()
}

fn with_input(app: &mut App, entity: Entity, apply: impl FnOnce(&mut MoveInput)) {
    let mut input = app.world_mut().get_mut::<MoveInput>(entity).unwrap();
    apply(&mut input);
}

/// Press an edge-flag for exactly one fixed tick.
fn press(app: &mut App, entity: Entity, set: fn(&mut MoveInput, bool)) {
    with_input(app, entity, |input| set(input, true));
    tick(app);
    with_input(app, entity, |input| set(input, false));
}

#[test]
fn first_activation_leaves_the_sentinel() {
    let mut app = create_test_app();
    app.world_mut().spawn(FixtureCollider::floor(0.0));
    let character = spawn_character(&mut app, Vec3::new(0.0, 3.0, 0.0), CharacterConfig::default());

    tick(&mut app);

    // PROOF: the sentinel activates into AirMove, and the exit event of the
    // old state precedes the enter event of the new one.
    let log = app.world().resource::<StateLog>();
    assert_eq!(
        log.0[..2],
        [
            (TransitionPhase::Exited, StateTag::Uninitialized),
            (TransitionPhase::Entered, StateTag::AirMove),
        ]
    );
    assert_eq!(current_state(&app, character), StateTag::AirMove);
}

#[test]
fn exit_always_precedes_the_next_enter() {
    let mut app = create_test_app();
    app.world_mut().spawn(FixtureCollider::floor(0.0));
    let character = spawn_character(&mut app, Vec3::new(0.0, 1.0, 0.0), CharacterConfig::default());

    // Fall, land, jump, land again: several transitions.
    run_ticks(&mut app, 40);
    press(&mut app, character, |input, value| input.jump_pressed = value);
    run_ticks(&mut app, 80);

    let log = app.world().resource::<StateLog>();
    assert!(log.0.len() >= 4, "expected several transitions, got {:?}", log.0);
    // PROOF: events strictly alternate Exited/Entered, so no enter ever
    // runs before the previous state's exit has completed.
    for (index, (phase, _)) in log.0.iter().enumerate() {
        let expected = if index % 2 == 0 {
            TransitionPhase::Exited
        } else {
            TransitionPhase::Entered
        };
        assert_eq!(*phase, expected, "event {index} out of order in {:?}", log.0);
    }
}

#[test]
fn landing_switches_air_to_ground() {
    let mut app = create_test_app();
    app.world_mut().spawn(FixtureCollider::floor(0.0));
    let character = spawn_character(&mut app, Vec3::new(0.0, 1.0, 0.0), CharacterConfig::default());

    run_ticks(&mut app, 40);

    assert_eq!(current_state(&app, character), StateTag::GroundMove);
    let log = app.world().resource::<StateLog>();
    assert!(log.0.contains(&(TransitionPhase::Exited, StateTag::AirMove)));
    assert!(log.0.contains(&(TransitionPhase::Entered, StateTag::GroundMove)));
}

#[test]
fn jump_grounds_to_air_and_back() {
    let mut app = create_test_app();
    app.world_mut().spawn(FixtureCollider::floor(0.0));
    let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());
    run_ticks(&mut app, 10);
    assert_eq!(current_state(&app, character), StateTag::GroundMove);

    press(&mut app, character, |input, value| input.jump_pressed = value);

    assert_eq!(current_state(&app, character), StateTag::AirMove);
    assert!(
        body(&app, character).relative_velocity.y > 5.0,
        "jump impulse should be applied"
    );

    run_ticks(&mut app, 80);
    assert_eq!(current_state(&app, character), StateTag::GroundMove, "lands again");
}

mod crouching {
    use super::*;

    #[test]
    fn crouch_shrinks_the_capsule_and_slows_movement() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());
        run_ticks(&mut app, 10);

        with_input(&mut app, character, |input| {
            input.crouch_pressed = true;
            input.crouch_held = true;
        });
        tick(&mut app);
        with_input(&mut app, character, |input| input.crouch_pressed = false);

        assert_eq!(current_state(&app, character), StateTag::Crouched);
        assert_eq!(body(&app, character).stance, Stance::Crouching);

        // Release with open sky above: back to standing ground movement.
        with_input(&mut app, character, |input| input.crouch_held = false);
        tick(&mut app);
        assert_eq!(current_state(&app, character), StateTag::GroundMove);
        assert_eq!(body(&app, character).stance, Stance::Standing);
    }

    #[test]
    fn no_room_to_stand_keeps_the_character_crouched() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        // A shelf with 1.2 m of clearance over x in [2, 6]: enough for the
        // crouched capsule (1.1 m), not for the standing one (1.8 m).
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(2.0, 0.25, 2.0)).at(Vec3::new(4.0, 1.45, 0.0)),
        );
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());
        run_ticks(&mut app, 10);

        // Crouch in the open, then walk under the shelf.
        with_input(&mut app, character, |input| {
            input.crouch_pressed = true;
            input.crouch_held = true;
        });
        tick(&mut app);
        with_input(&mut app, character, |input| {
            input.crouch_pressed = false;
            input.set_move(Vec2::new(1.0, 0.0));
        });
        run_ticks(&mut app, 90);
        let x = app
            .world()
            .get::<Transform>(character)
            .unwrap()
            .translation
            .x;
        assert!(
            (2.5..5.5).contains(&x),
            "character should be under the shelf, got x={x}"
        );

        // Release crouch under the shelf.
        with_input(&mut app, character, |input| {
            input.crouch_held = false;
            input.set_move(Vec2::ZERO);
        });
        run_ticks(&mut app, 5);

        // PROOF: the overhead clearance check vetoes standing up.
        assert_eq!(current_state(&app, character), StateTag::Crouched);
        assert_eq!(body(&app, character).stance, Stance::Crouching);
    }
}

mod swimming {
    use super::*;

    fn pool_app() -> (App, Entity) {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(-10.0));
        // Water from y=-8 up to the surface at y=0.
        app.world_mut().spawn(
            FixtureCollider::cuboid(Vec3::new(10.0, 4.0, 10.0))
                .at(Vec3::new(0.0, -4.0, 0.0))
                .as_trigger()
                .with_tags(WATER_TAG),
        );
        let config = CharacterConfig::default().with_surface_tags(WATER_TAG, 0, 0);
        let character = spawn_character(&mut app, Vec3::new(0.0, 0.5, 0.0), config);
        (app, character)
    }

    #[test]
    fn deep_water_starts_swimming() {
        let (mut app, character) = pool_app();

        run_ticks(&mut app, 60);

        assert_eq!(current_state(&app, character), StateTag::Swimming);
        assert_eq!(body(&app, character).stance, Stance::Swimming);
        // PROOF: water drag stopped the plunge.
        assert!(
            body(&app, character).relative_velocity.length() < 2.0,
            "drag should arrest the fall, got {}",
            body(&app, character).relative_velocity
        );
    }

    #[test]
    fn surfacing_hands_over_to_air_move() {
        let (mut app, character) = pool_app();
        run_ticks(&mut app, 60);
        assert_eq!(current_state(&app, character), StateTag::Swimming);

        // Hold "up" until the immersion probe leaves the water.
        with_input(&mut app, character, |input| input.jump_held = true);
        run_ticks(&mut app, 150);

        let log = app.world().resource::<StateLog>();
        assert!(
            log.0.contains(&(TransitionPhase::Exited, StateTag::Swimming)),
            "swimming should end after surfacing: {:?}",
            log.0
        );
        assert!(log.0.contains(&(TransitionPhase::Entered, StateTag::AirMove)));
    }
}

mod climbing {
    use super::*;

    fn wall_app() -> (App, Entity) {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        // A climbable wall filling z <= -1, faced by the character.
        app.world_mut().spawn(
            FixtureCollider::half_space(Vec3::Z)
                .at(Vec3::new(0.0, 0.0, -1.0))
                .with_tags(CLIMB_TAG),
        );
        let config = CharacterConfig::default().with_surface_tags(0, CLIMB_TAG, 0);
        let character = spawn_character(&mut app, Vec3::new(0.0, 0.0, -0.5), config);
        run_ticks(&mut app, 10);
        (app, character)
    }

    #[test]
    fn climb_input_attaches_to_the_wall() {
        let (mut app, character) = wall_app();
        assert_eq!(current_state(&app, character), StateTag::GroundMove);

        press(&mut app, character, |input, value| input.climb_pressed = value);

        assert_eq!(current_state(&app, character), StateTag::Climbing);
        assert_eq!(body(&app, character).stance, Stance::Climbing);
        assert!(!body(&app, character).is_grounded, "climbing is never grounded");
    }

    #[test]
    fn climbing_up_gains_height_and_jump_releases() {
        let (mut app, character) = wall_app();
        press(&mut app, character, |input, value| input.climb_pressed = value);
        assert_eq!(current_state(&app, character), StateTag::Climbing);

        with_input(&mut app, character, |input| input.set_move(Vec2::new(0.0, 1.0)));
        run_ticks(&mut app, 50);

        let height = app
            .world()
            .get::<Transform>(character)
            .unwrap()
            .translation
            .y;
        assert!(height > 0.5, "forward input climbs the wall, got y={height}");

        press(&mut app, character, |input, value| input.jump_pressed = value);
        assert_eq!(current_state(&app, character), StateTag::AirMove);
        assert_eq!(body(&app, character).stance, Stance::Standing);
    }
}

mod god_mode {
    use super::*;

    #[test]
    fn god_mode_ignores_collisions_and_toggles_back() {
        let mut app = create_test_app();
        app.world_mut().spawn(FixtureCollider::floor(0.0));
        app.world_mut()
            .spawn(FixtureCollider::half_space(Vec3::NEG_X).at(Vec3::new(1.0, 0.0, 0.0)));
        let character = spawn_character(&mut app, Vec3::ZERO, CharacterConfig::default());
        run_ticks(&mut app, 10);

        press(&mut app, character, |input, value| {
            input.god_toggle_pressed = value
        });
        assert_eq!(current_state(&app, character), StateTag::GodMode);

        // PROOF: god mode flies straight through the wall that blocks the
        // colliding states.
        with_input(&mut app, character, |input| input.set_move(Vec2::new(1.0, 0.0)));
        run_ticks(&mut app, 60);
        let x = app
            .world()
            .get::<Transform>(character)
            .unwrap()
            .translation
            .x;
        assert!(x > 1.5, "god mode should pass through the wall, got x={x}");

        press(&mut app, character, |input, value| {
            input.god_toggle_pressed = value
        });
        assert_eq!(current_state(&app, character), StateTag::AirMove);
    }
}
