// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Monotonic millisecond clock used for message scheduling.
//!
//! All due times and delays in this crate are measured in milliseconds on a single
//! process-wide monotonic timeline. The timeline is anchored to an [`Instant`] captured
//! on first use, so values are small, never go backwards, and survive wall-clock
//! adjustments.

use std::{sync::OnceLock, time::Instant};

/// Park sentinel used when a queue has no timed work: "wait practically forever, but
/// remain interruptible". Roughly 27 hours.
pub const MAX_WAIT_MS: u64 = 100_000_000;

/// Process epoch. Captured once, on the first call to [`now_ms()`].
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the number of milliseconds elapsed since the process epoch.
///
/// Monotonic and non-decreasing across threads. The first caller observes a value at
/// or near `0`.
#[must_use]
pub fn now_ms() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    // u64 milliseconds overflow after ~584 million years of uptime.
    epoch.elapsed().as_millis() as u64
}
