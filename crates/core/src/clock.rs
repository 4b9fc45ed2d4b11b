// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Epoch-millisecond clock.
//!
//! Everything time-shaped in a diagnosis is an epoch-millisecond value
//! persisted on a status: acceptance start times, condition transition
//! times, deadline arithmetic. The clock trait exposes exactly that surface
//! so the engine's timeout checks and the reconcilers' condition stamps are
//! drivable from tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of epoch-millisecond readings.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Milliseconds elapsed since an earlier persisted reading. Saturates
    /// at zero when the reading is ahead of this clock, so deadline checks
    /// stay sane across writers with skewed clocks.
    fn since_ms(&self, earlier_ms: u64) -> u64 {
        self.epoch_ms().saturating_sub(earlier_ms)
    }
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Test clock: a shared epoch counter that only moves when a test says so.
///
/// Clones share the counter, so the clock handed to an engine and the one
/// advanced by the test (or by a dispatcher hook mid-run) observe the same
/// timeline. Starts at a fixed epoch so persisted timestamps are assertable.
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<AtomicU64>,
}

/// Where [`FakeClock`] timelines begin.
pub const FAKE_CLOCK_EPOCH_MS: u64 = 1_000_000;

impl FakeClock {
    pub fn new() -> Self {
        Self { epoch_ms: Arc::new(AtomicU64::new(FAKE_CLOCK_EPOCH_MS)) }
    }

    /// Advance the shared timeline.
    pub fn advance(&self, duration: Duration) {
        self.epoch_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump the shared timeline to an absolute reading.
    pub fn set_epoch_ms(&self, ms: u64) {
        self.epoch_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.epoch_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
