// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A monotonic-ish nanosecond clock shared by the scheduler's wait deadline
//! and its `now()` computation (spec §4.2 "Time base": both must use the
//! same clock to avoid drift).

use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds elapsed since this process's first call into the scheduler
/// crate. Monotonic within a process; not meaningful across processes.
pub fn now_ns() -> u64 {
    PROCESS_START.elapsed().as_nanos() as u64
}

/// Converts an absolute `now_ns()`-scale deadline into a `Duration` to wait,
/// saturating at zero for deadlines already in the past.
pub fn duration_until(deadline_ns: u64) -> Duration {
    Duration::from_nanos(deadline_ns.saturating_sub(now_ns()))
}
