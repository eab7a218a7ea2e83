// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time sources for the daemon.
//!
//! Components take a [`Clock`] instead of reading time directly so the
//! idle-threshold and timestamp logic can be driven deterministically in
//! tests. The two views serve different consumers: [`Clock::now`] feeds
//! monotonic elapsed-time comparisons (session idle tracking), while
//! [`Clock::epoch_secs`] is what lands in store columns, where zero means
//! "absent".

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync {
    /// Monotonic instant for elapsed-time comparisons.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch.
    fn epoch_secs(&self) -> u64;
}

/// The real system clocks.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Epoch second the fake clock starts at. Arbitrary but fixed, so test
/// assertions on stored timestamps stay stable.
const FAKE_EPOCH_START: u64 = 1_000_000;

struct FakeTime {
    instant: Instant,
    epoch_secs: u64,
}

/// Test clock that only moves when told to.
///
/// [`advance`](Self::advance) moves both views together, mirroring real
/// time. The instant view cannot be set or rewound independently: the
/// bridge's idle detection compares instants and assumes they never go
/// backwards. The epoch view can be pinned with
/// [`set_epoch_secs`](Self::set_epoch_secs) when a test needs a specific
/// stored timestamp.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                epoch_secs: FAKE_EPOCH_START,
            })),
        }
    }

    /// Move both time views forward. Clones share the shift.
    pub fn advance(&self, by: Duration) {
        let mut time = self.inner.lock();
        time.instant += by;
        time.epoch_secs += by.as_secs();
    }

    /// Pin the wall-clock view. The monotonic view is untouched.
    pub fn set_epoch_secs(&self, secs: u64) {
        self.inner.lock().epoch_secs = secs;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().instant
    }

    fn epoch_secs(&self) -> u64 {
        self.inner.lock().epoch_secs
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
