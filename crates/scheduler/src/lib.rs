// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A time-driven job scheduler (spec C2): one dispatcher thread per
//! [`Scheduler`] that sleeps until the earliest due schedule, hands its
//! function to a [`threadpool::ThreadPool`], reschedules it, and honors
//! add/remove/delete.
//!
//! Grounded directly on `examples/original_source/src/c/scheduler.c`
//! (`iot_scheduler_thread`, `iot_schedule_add`/`_remove`/`_delete`); the
//! dispatcher algorithm and lock discipline below are a line-for-line
//! translation of that loop into `std::sync::Condvar`/`Mutex`, matching the
//! `Condvar`-driven dispatcher shape also used by
//! `examples/other_examples/.../job_scheduler-src-scheduler.rs.rs`.

#![forbid(unsafe_code)]

mod queue;
mod schedule;
mod time;

pub use queue::ScheduleQueue;
pub use schedule::{Job, Schedule};
pub use threadpool::ThreadPool;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A handle to a created [`Schedule`]; owning one keeps the schedule alive.
pub type ScheduleHandle = Arc<Schedule>;

/// Errors raised by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `period_ns` must be greater than zero (spec §3).
    #[error("period must be greater than zero")]
    InvalidPeriod,
}

struct SchedulerState {
    active: ScheduleQueue,
    idle: ScheduleQueue,
    running: bool,
}

/// Owns the dispatcher thread, the active/idle schedule queues, and a
/// handle to the external thread pool jobs are posted to.
pub struct Scheduler {
    pool: Arc<dyn ThreadPool>,
    state: Mutex<SchedulerState>,
    cond: Condvar,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Creates an idle scheduler. The dispatcher thread is not started until
    /// [`Scheduler::start`] is called.
    pub fn new(pool: Arc<dyn ThreadPool>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            state: Mutex::new(SchedulerState {
                active: ScheduleQueue::new(),
                idle: ScheduleQueue::new(),
                running: false,
            }),
            cond: Condvar::new(),
            dispatcher: parking_lot::Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns another handle to this scheduler. Equivalent to `Arc::clone`;
    /// kept as a named method to mirror the spec's `add_ref` contract (spec
    /// §4.2). There is no explicit `free`: dropping the last `Arc` runs
    /// [`Drop`], which stops the dispatcher.
    pub fn add_ref(self: &Arc<Self>) -> Arc<Self> {
        Arc::clone(self)
    }

    pub fn thread_pool(&self) -> Arc<dyn ThreadPool> {
        Arc::clone(&self.pool)
    }

    /// Spawns the dispatcher thread. Idempotent once running.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.running {
                return;
            }
            state.running = true;
        }
        let scheduler = Arc::clone(self);
        let handle = thread::spawn(move || dispatcher_loop(scheduler));
        *self.dispatcher.lock() = Some(handle);
    }

    /// Clears `running`, wakes the dispatcher, waits for the thread pool to
    /// drain in-flight work, and joins the dispatcher thread. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.running {
                return;
            }
            state.running = false;
        }
        self.cond.notify_all();
        self.pool.wait();
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
    }

    /// Creates a schedule and links it into the idle queue.
    ///
    /// `start_in` of zero fires immediately once added (spec: `start_ns` of
    /// 0 means "fires immediately on add"). `repeat` of 0 means infinite;
    /// `N` means fire exactly `N` times.
    pub fn schedule_create(
        &self,
        job: impl Fn() + Send + Sync + 'static,
        period: Duration,
        start_in: Duration,
        repeat: u64,
        priority: Option<i32>,
    ) -> Result<ScheduleHandle, SchedulerError> {
        let period_ns = period.as_nanos() as u64;
        if period_ns == 0 {
            return Err(SchedulerError::InvalidPeriod);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let next_start_ns = time::now_ns() + start_in.as_nanos() as u64;
        let schedule = Schedule::new(id, Arc::new(job), period_ns, next_start_ns, repeat, priority);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.idle.insert(Arc::clone(&schedule));
        Ok(schedule)
    }

    /// Moves `schedule` from the idle to the active queue. Returns `true` if
    /// it was idle (state changed); `false` if it was already active.
    pub fn schedule_add(&self, schedule: &ScheduleHandle) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if schedule.is_scheduled() {
            return false;
        }
        state.idle.remove(schedule);
        state.active.insert(Arc::clone(schedule));
        schedule.set_scheduled(true);
        let became_head = state
            .active
            .front()
            .map(|front| Arc::ptr_eq(front, schedule))
            .unwrap_or(false);
        if became_head && state.running {
            self.cond.notify_all();
        }
        true
    }

    /// Moves `schedule` from the active to the idle queue. Returns `true` if
    /// it was active (state changed).
    ///
    /// Matches `iot_schedule_remove`: takes effect immediately but, like the
    /// C reference, does not wake the dispatcher even when the removed
    /// schedule was the head. A sleeping dispatcher is woken by its own
    /// stale deadline and simply re-evaluates the (now different) head at
    /// that point; it never posts the removed schedule's job again.
    pub fn schedule_remove(&self, schedule: &ScheduleHandle) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !schedule.is_scheduled() {
            return false;
        }
        state.active.remove(schedule);
        state.idle.insert(Arc::clone(schedule));
        schedule.set_scheduled(false);
        true
    }

    /// Unlinks `schedule` from whichever queue holds it and drops it.
    pub fn schedule_delete(&self, schedule: ScheduleHandle) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if schedule.is_scheduled() {
            state.active.remove(&schedule);
        } else {
            state.idle.remove(&schedule);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatcher_loop(scheduler: Arc<Scheduler>) {
    loop {
        let guard = scheduler.state.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.running {
            return;
        }
        let deadline_ns = match guard.active.front() {
            Some(s) => s.next_start_ns(),
            None => time::now_ns() + Duration::from_secs(1).as_nanos() as u64,
        };
        let wait_for = time::duration_until(deadline_ns);
        let (mut guard, timeout) = scheduler
            .cond
            .wait_timeout(guard, wait_for)
            .unwrap_or_else(|e| e.into_inner());

        if !guard.running {
            return;
        }
        if !timeout.timed_out() {
            // Signaled: active queue's head (or `running`) changed. Loop
            // back around to recompute the deadline against the new state.
            continue;
        }
        let Some(current) = guard.active.pop_front() else {
            continue;
        };
        dispatch_one(&scheduler, &mut guard, current);
    }
}

fn dispatch_one(scheduler: &Arc<Scheduler>, state: &mut SchedulerState, current: ScheduleHandle) {
    let job = current.job();
    let priority = current.priority();
    scheduler.pool.add_work(
        Box::new(move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*job)())) {
                log::error!("scheduled job panicked: {:?}", panic_message(&panic));
            }
        }),
        priority,
    );

    let now = time::now_ns();
    current.set_next_start_ns(now + current.period_ns());

    let remaining = current.remaining();
    if remaining != 0 {
        let new_remaining = remaining - 1;
        current.set_remaining(new_remaining);
        if new_remaining == 0 {
            current.set_scheduled(false);
            state.idle.insert(current);
            return;
        }
    }
    current.set_scheduled(true);
    state.active.insert(current);
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread::sleep;
    use threadpool::FixedThreadPool;

    fn pool(n: usize) -> Arc<FixedThreadPool> {
        let p = FixedThreadPool::new(n);
        p.start();
        p
    }

    #[test]
    fn zero_period_is_rejected() {
        let scheduler = Scheduler::new(pool(1));
        let err = scheduler
            .schedule_create(|| {}, Duration::from_secs(0), Duration::ZERO, 0, None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidPeriod));
    }

    #[test]
    fn newly_created_schedule_starts_idle() {
        let scheduler = Scheduler::new(pool(1));
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let handle = scheduler
            .schedule_create(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(10),
                Duration::ZERO,
                0,
                None,
            )
            .unwrap();
        assert!(!handle.is_scheduled());
        scheduler.start();
        sleep(Duration::from_millis(100));
        scheduler.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn basic_dispatch_fires_added_schedules_only() {
        let scheduler = Scheduler::new(pool(4));
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        let c = Arc::new(AtomicU32::new(0));

        let ha = {
            let a = Arc::clone(&a);
            scheduler
                .schedule_create(
                    move || {
                        a.fetch_add(1, Ordering::SeqCst);
                    },
                    Duration::from_millis(100),
                    Duration::ZERO,
                    0,
                    None,
                )
                .unwrap()
        };
        let hb = {
            let b = Arc::clone(&b);
            scheduler
                .schedule_create(
                    move || {
                        b.fetch_add(1, Ordering::SeqCst);
                    },
                    Duration::from_millis(300),
                    Duration::ZERO,
                    0,
                    None,
                )
                .unwrap()
        };
        let _hc = {
            let c = Arc::clone(&c);
            scheduler
                .schedule_create(
                    move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    },
                    Duration::from_millis(300),
                    Duration::ZERO,
                    0,
                    None,
                )
                .unwrap()
        };

        scheduler.schedule_add(&ha);
        scheduler.schedule_add(&hb);
        scheduler.start();
        sleep(Duration::from_millis(700));
        scheduler.stop();

        assert!(a.load(Ordering::SeqCst) > 0);
        assert!(b.load(Ordering::SeqCst) > 0);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn finite_repeat_fires_exactly_n_times() {
        let scheduler = Scheduler::new(pool(2));
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let handle = scheduler
            .schedule_create(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(50),
                Duration::ZERO,
                5,
                None,
            )
            .unwrap();
        scheduler.schedule_add(&handle);
        scheduler.start();
        sleep(Duration::from_millis(800));
        scheduler.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!handle.is_scheduled());
    }

    #[test]
    fn remove_silences_future_firings() {
        let scheduler = Scheduler::new(pool(2));
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let handle = scheduler
            .schedule_create(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(20),
                Duration::ZERO,
                0,
                None,
            )
            .unwrap();
        scheduler.schedule_add(&handle);
        scheduler.start();
        sleep(Duration::from_millis(100));
        scheduler.schedule_remove(&handle);
        let after_remove = counter.load(Ordering::SeqCst);
        sleep(Duration::from_millis(200));
        scheduler.stop();
        // allow one in-flight firing to land right after the remove call
        assert!(counter.load(Ordering::SeqCst) <= after_remove + 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let scheduler = Scheduler::new(pool(1));
        scheduler.start();
        scheduler.stop();
        scheduler.stop();
    }

    #[test]
    fn schedule_add_twice_is_noop() {
        let scheduler = Scheduler::new(pool(1));
        let handle = scheduler
            .schedule_create(|| {}, Duration::from_millis(10), Duration::ZERO, 0, None)
            .unwrap();
        assert!(scheduler.schedule_add(&handle));
        assert!(!scheduler.schedule_add(&handle));
    }
}
