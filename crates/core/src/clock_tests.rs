// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_epoch_is_sane() {
    let clock = SystemClock;
    // After 2020, before 2100.
    assert!(clock.epoch_ms() > 1_577_836_800_000);
    assert!(clock.epoch_ms() < 4_102_444_800_000);
}

#[test]
fn fake_clock_starts_at_fixed_epoch() {
    let clock = FakeClock::new();
    assert_eq!(clock.epoch_ms(), FAKE_CLOCK_EPOCH_MS);
}

#[test]
fn fake_clock_advance_moves_the_timeline() {
    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(30));
    assert_eq!(clock.epoch_ms(), FAKE_CLOCK_EPOCH_MS + 30_000);
}

#[test]
fn fake_clock_clones_share_the_timeline() {
    let clock = FakeClock::new();
    let other = clock.clone();

    clock.advance(Duration::from_millis(250));

    assert_eq!(other.epoch_ms(), FAKE_CLOCK_EPOCH_MS + 250);
}

#[test]
fn fake_clock_set_epoch_ms() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn since_ms_measures_elapsed_deadline_time() {
    let clock = FakeClock::new();
    let started = clock.epoch_ms();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.since_ms(started), 90_000);
}

#[test]
fn since_ms_saturates_on_future_readings() {
    let clock = FakeClock::new();
    // A start time written by a writer whose clock ran ahead.
    assert_eq!(clock.since_ms(FAKE_CLOCK_EPOCH_MS + 5_000), 0);
}
