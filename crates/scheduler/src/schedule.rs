// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A single repeating job descriptor (spec §3 "Schedule").
//!
//! Mutable fields (`next_start_ns`, `remaining`, `scheduled`) are atomics
//! rather than a `Mutex`-guarded struct: every mutation happens while the
//! owning [`crate::Scheduler`]'s queue mutex is already held, so the atomics
//! exist only to give `Arc<Schedule>` the `Sync` a shared, mutable handle
//! needs, the same shape `knhk-workflow-engine`'s
//! `LatencyBoundedScheduler` uses for its counters.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

/// The function a schedule invokes on each firing.
///
/// `Fn` (not `FnOnce`) because a schedule fires repeatedly; callers capture
/// their own argument in the closure rather than the C reference's separate
/// `void * arg` parameter.
pub type Job = Arc<dyn Fn() + Send + Sync + 'static>;

/// A periodic job descriptor.
///
/// Identity (for queue membership and equality) is the monotonically
/// increasing `id`, assigned by the owning scheduler.
pub struct Schedule {
    id: u64,
    job: Job,
    period_ns: u64,
    next_start_ns: AtomicU64,
    /// 0 means infinite (spec §3); non-zero decrements toward 0 on each firing.
    remaining: AtomicU64,
    priority: AtomicI32,
    prio_set: AtomicBool,
    scheduled: AtomicBool,
}

impl Schedule {
    pub(crate) fn new(
        id: u64,
        job: Job,
        period_ns: u64,
        next_start_ns: u64,
        remaining: u64,
        priority: Option<i32>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            job,
            period_ns,
            next_start_ns: AtomicU64::new(next_start_ns),
            remaining: AtomicU64::new(remaining),
            priority: AtomicI32::new(priority.unwrap_or(0)),
            prio_set: AtomicBool::new(priority.is_some()),
            scheduled: AtomicBool::new(false),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(
        id: u64,
        job: Job,
        period_ns: u64,
        next_start_ns: u64,
        remaining: u64,
        priority: Option<i32>,
    ) -> Arc<Self> {
        Self::new(id, job, period_ns, next_start_ns, remaining, priority)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn next_start_ns(&self) -> u64 {
        self.next_start_ns.load(Ordering::SeqCst)
    }

    pub(crate) fn set_next_start_ns(&self, ns: u64) {
        self.next_start_ns.store(ns, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub(crate) fn set_remaining(&self, value: u64) {
        self.remaining.store(value, Ordering::SeqCst);
    }

    /// `Some(priority)` if this schedule carries an explicit priority, else
    /// `None` to let the thread pool use its default.
    pub fn priority(&self) -> Option<i32> {
        self.prio_set
            .load(Ordering::SeqCst)
            .then(|| self.priority.load(Ordering::SeqCst))
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_scheduled(&self, value: bool) {
        self.scheduled.store(value, Ordering::SeqCst);
    }

    pub(crate) fn job(&self) -> Job {
        Arc::clone(&self.job)
    }
}
