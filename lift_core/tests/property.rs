use lift_config::MachineCfg;
use lift_core::envelope::{Envelope, Motion};
use lift_core::menu::{Menu, MenuPage, PAGE_COUNT};
use lift_core::mocks::MemStore;
use lift_core::settings::LiftSettings;
use proptest::prelude::*;

prop_compose! {
    // A workspace band plus a probe position somewhere around it.
    fn band_and_pos()(
        lower in -100_000i64..100_000,
        span in 0i64..200_000,
        offset in -300_000i64..300_000,
    ) -> (i64, i64, i64) {
        (lower, lower + span, lower + offset)
    }
}

prop_compose! {
    // A random walk over the editor pages plus detent bursts to apply.
    fn edit_script()(
        script in prop::collection::vec((0i64..PAGE_COUNT, -50i64..50), 1..40),
    ) -> Vec<(i64, i64)> {
        script
    }
}

proptest! {
    #[test]
    fn workspace_never_lets_the_carriage_leave_the_band(
        (lower, upper, pos) in band_and_pos(),
        magnitude in 1.0f32..2000.0,
        reach in 1i64..50_000,
    ) {
        let mut env = Envelope::new();
        env.activate_workspace(lower, upper - lower);

        let down = Motion::Constant { speed: -magnitude };
        let up = Motion::Constant { speed: magnitude };
        let ramp_down = Motion::Ramped { target: pos - reach };
        let ramp_up = Motion::Ramped { target: pos + reach };

        if pos <= lower {
            // At or past the lower bound, nothing may head further down.
            prop_assert!(!env.permits(pos, down));
            prop_assert!(!env.permits(pos, ramp_down));
        }
        if pos >= upper {
            prop_assert!(!env.permits(pos, up));
            prop_assert!(!env.permits(pos, ramp_up));
        }
        if pos < lower {
            // Strictly outside, driving back toward the band is always open.
            prop_assert!(env.permits(pos, up));
        }
        if pos > upper {
            prop_assert!(env.permits(pos, down));
        }
    }

    #[test]
    fn target_lock_never_blocks_rising_moves(
        floor in -100_000i64..100_000,
        offset in -200_000i64..200_000,
        magnitude in 1.0f32..2000.0,
        reach in 1i64..50_000,
    ) {
        let mut env = Envelope::new();
        env.activate_target(floor, 12.5);
        let pos = floor + offset;

        let up = Motion::Constant { speed: magnitude };
        let ramp_up = Motion::Ramped { target: pos + reach };
        prop_assert!(env.permits(pos, up));
        prop_assert!(env.permits(pos, ramp_up));

        let descent_open = env.permits(pos, Motion::Constant { speed: -magnitude });
        prop_assert_eq!(descent_open, pos > floor);
    }

    #[test]
    fn rebase_is_a_pure_translation(
        (lower, upper, pos) in band_and_pos(),
        lock in -100_000i64..100_000,
        shift in -500_000i64..500_000,
        speed in -2000.0f32..2000.0,
        reach in -50_000i64..50_000,
    ) {
        let mut env = Envelope::new();
        env.activate_workspace(lower, upper - lower);
        env.activate_target(lock, 0.0);

        let mut shifted = env.clone();
        shifted.rebase(shift);

        let constant = Motion::Constant { speed };
        prop_assert_eq!(
            env.permits(pos, constant),
            shifted.permits(pos - shift, constant),
        );
        prop_assert_eq!(
            env.permits(pos, Motion::Ramped { target: pos + reach }),
            shifted.permits(pos - shift, Motion::Ramped { target: pos + reach - shift }),
        );
    }

    #[test]
    fn menu_walk_lands_on_the_ring_position(steps in prop::collection::vec(any::<bool>(), 0..120)) {
        let mut menu = Menu::new();
        let mut net = 0i64;
        for forward in &steps {
            if *forward {
                menu.forward();
                net += 1;
            } else {
                menu.back();
                net -= 1;
            }
        }
        prop_assert_eq!(menu.page(), MenuPage::from_index(net));
    }

    #[test]
    fn edit_floors_survive_arbitrary_detent_storms(script in edit_script()) {
        let machine = MachineCfg::rev_a();
        let mut store = MemStore::new();
        let mut settings = LiftSettings::load(&mut store, &machine);
        let slow_floor = LiftSettings::factory_steps_slow(&machine);
        let fast_floor = LiftSettings::factory_steps_fast(&machine);

        for (page_idx, detents) in script {
            let mut menu = Menu::new();
            for _ in 0..page_idx {
                menu.forward();
            }
            if detents != 0 {
                menu.apply(&mut settings, &mut store, &machine, detents).unwrap();
            }

            prop_assert!(settings.max_speed >= 0);
            prop_assert!(settings.acceleration >= 0);
            prop_assert!(settings.steps_per_revolution >= 0);
            prop_assert!(settings.toolchange_speed >= 0);
            prop_assert!(settings.auto_zero_speed >= 0);
            prop_assert!(settings.thread_pitch_mm >= 0.0);
            prop_assert!(settings.workspace_height_mm >= 0.0);
            prop_assert!(settings.steps_slow >= slow_floor);
            prop_assert!(settings.steps_fast >= fast_floor);
            prop_assert!(settings.direction == -1 || settings.direction == 1);
        }
    }

    #[test]
    fn display_position_is_antisymmetric(steps in -10_000_000i64..10_000_000) {
        let mut store = MemStore::new();
        let settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());
        prop_assert_eq!(
            settings.position_in_mm(-steps),
            -settings.position_in_mm(steps),
        );
    }

    #[test]
    fn step_conversion_is_monotone(a in -10_000.0f32..10_000.0, b in -10_000.0f32..10_000.0) {
        let mut store = MemStore::new();
        let settings = LiftSettings::load(&mut store, &MachineCfg::rev_a());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(settings.steps_for_mm(lo) <= settings.steps_for_mm(hi));
    }
}
