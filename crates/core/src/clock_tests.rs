// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{Clock, FakeClock, SystemClock, FAKE_EPOCH_START};

#[test]
fn system_clock_epoch_secs_is_recent() {
    let clock = SystemClock;
    // Well after 2020-01-01, well before the year 3000.
    let secs = clock.epoch_secs();
    assert!(secs > 1_577_836_800);
    assert!(secs < 32_503_680_000);
}

#[test]
fn fake_clock_starts_at_the_fixed_epoch() {
    assert_eq!(FakeClock::new().epoch_secs(), FAKE_EPOCH_START);
}

#[test]
fn advance_moves_both_views_together() {
    let clock = FakeClock::new();
    let start_instant = clock.now();
    let start_epoch = clock.epoch_secs();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.now() - start_instant, Duration::from_secs(90));
    assert_eq!(clock.epoch_secs(), start_epoch + 90);
}

#[test]
fn set_epoch_secs_pins_only_the_wall_clock_view() {
    let clock = FakeClock::new();
    let instant_before = clock.now();

    clock.set_epoch_secs(42);

    assert_eq!(clock.epoch_secs(), 42);
    assert_eq!(clock.now(), instant_before);
}

#[test]
fn clones_share_the_same_time() {
    let clock = FakeClock::new();
    let other = clock.clone();

    clock.advance(Duration::from_secs(5));

    assert_eq!(other.epoch_secs(), clock.epoch_secs());
    assert_eq!(other.now(), clock.now());
}

#[test]
fn time_never_goes_backwards_under_repeated_advances() {
    let clock = FakeClock::new();
    let mut last = clock.now();
    for _ in 0..5 {
        clock.advance(Duration::from_millis(1500));
        let now = clock.now();
        assert!(now > last);
        last = now;
    }
}
