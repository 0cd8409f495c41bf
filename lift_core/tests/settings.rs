//! Settings persistence and unit conversion behavior.

use lift_config::MachineCfg;
use lift_core::mocks::MemStore;
use lift_core::settings::key;
use lift_core::LiftSettings;
use lift_traits::SettingsStore;

#[test]
fn empty_store_loads_deployment_defaults() {
    let mut store = MemStore::new();
    let settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());

    let expected = LiftSettings {
        steps_per_revolution: 1600,
        thread_pitch_mm: 8.0,
        steps_slow: 10,
        steps_fast: 200,
        direction: -1,
        max_speed: 1600,
        toolchange_speed: 1600,
        acceleration: 400,
        auto_zero_speed: 1600,
        end_stop_normally_closed: false,
        tool_length_normally_closed: false,
        tool_length_enable_normally_closed: false,
        tool_length_height_mm: 0.0,
        workspace_height_mm: 75.0,
        power_on_toolchange: false,
    };
    assert_eq!(settings, expected);
}

#[test]
fn stored_values_win_over_defaults() {
    let mut store = MemStore::new()
        .with_i64(key::MOTOR_SPEED_MAX, 650)
        .with_i64(key::STEPS_SLOW, 42)
        .with_bool(key::END_STOP_NC, true)
        .with_f32(key::WORKSPACE_HEIGHT, 33.5);

    let settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());
    assert_eq!(settings.max_speed, 650);
    assert_eq!(settings.steps_slow, 42);
    assert!(settings.end_stop_normally_closed);
    assert_eq!(settings.workspace_height_mm, 33.5);
    // Untouched fields still come from the deployment defaults.
    assert_eq!(settings.steps_fast, 200);
    assert_eq!(settings.direction, -1);
}

#[test]
fn factory_detents_follow_the_machine_geometry() {
    // Rev A: 0.005 mm/step.
    let rev_a = MachineCfg::rev_a();
    assert_eq!(LiftSettings::factory_steps_slow(&rev_a), 10);
    assert_eq!(LiftSettings::factory_steps_fast(&rev_a), 200);

    // Rev B runs full steps at 0.02 mm/step.
    let rev_b = MachineCfg::rev_b();
    assert_eq!(LiftSettings::factory_steps_fast(&rev_b), 50);
}

#[test]
fn display_position_follows_the_direction_sign() {
    let mut store = MemStore::new();
    let mut settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());

    // Rev A direction is -1: raw-negative steps read as positive height.
    assert_eq!(settings.position_in_mm(-1000), 5.0);
    assert_eq!(settings.position_in_mm(200), -1.0);

    settings.direction = 1;
    assert_eq!(settings.position_in_mm(-1000), -5.0);
}

#[test]
fn steps_for_mm_truncates_toward_zero() {
    let mut store = MemStore::new();
    let settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());

    assert_eq!(settings.steps_for_mm(3.0), 600);
    assert_eq!(settings.steps_for_mm(-3.0), -600);
    assert_eq!(settings.steps_for_mm(0.0049), 0);
}

#[test]
fn setters_persist_under_stable_keys() {
    let mut store = MemStore::new();
    let mut settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());

    settings.set_max_speed(&mut store, 900).expect("persist");
    settings
        .set_power_on_toolchange(&mut store, true)
        .expect("persist");
    settings
        .set_tool_length_height_mm(&mut store, 4.31)
        .expect("persist");

    // The wire names are what deployed stores already hold; they must not
    // drift with refactors.
    assert_eq!(store.get_i64("motor_speed_max", -1), 900);
    assert!(store.get_bool("pwr_on_toolch", false));
    assert_eq!(store.get_f32("tlsensor_height", 0.0), 4.31);
}

#[test]
fn reset_wipes_the_store_and_reloads_defaults() {
    let mut store = MemStore::new()
        .with_i64(key::MOTOR_SPEED_MAX, 650)
        .with_f32(key::THREAD_PITCH, 2.0);

    let settings = LiftSettings::reset(&mut store, &MachineCfg::rev_a()).expect("reset");
    assert!(store.is_empty());
    assert_eq!(settings.max_speed, 1600);
    assert_eq!(settings.thread_pitch_mm, 8.0);
}

#[test]
fn detent_steps_track_geometry_edits() {
    let mut store = MemStore::new();
    let mut settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());
    assert_eq!(settings.slow_detent_steps(), 10);
    assert_eq!(settings.fast_detent_steps(), 200);

    // Halving the resolution doubles the per-step travel.
    settings
        .set_steps_per_revolution(&mut store, 800)
        .expect("persist");
    assert!((settings.mm_per_step() - 0.01).abs() < 1e-6);
    assert_eq!(settings.slow_detent_steps(), 5);
    assert_eq!(settings.fast_detent_steps(), 100);
}
