// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A small priority-aware worker pool.
//!
//! This is the "external thread pool primitive" the scheduler and bus spec
//! treat as an out-of-scope collaborator (spec §4.5): `add_work` posts
//! non-blockingly, `wait` blocks until nothing posted before the call is
//! still running, and `start`/`stop` bracket the worker threads' lifetime.
//! Priority is a best-effort dispatch hint, not a real-time guarantee: a
//! pending job with a higher priority is picked before a lower-priority one
//! queued earlier, but a job already running is never preempted.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

/// A unit of work posted to the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The contract the scheduler and bus depend on; kept as a trait so tests can
/// substitute a deterministic fake pool.
pub trait ThreadPool: Send + Sync {
    /// Posts `job` for execution, optionally at `priority` (higher runs first
    /// among jobs still queued). Returns immediately; never runs `job`
    /// inline. Returns `false` if the pool has been stopped and the job was
    /// dropped without running.
    fn add_work(&self, job: Job, priority: Option<i32>) -> bool;

    /// Blocks until no job posted before this call is still queued or
    /// executing.
    fn wait(&self);
}

struct QueuedJob {
    priority: i32,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority pops first, and among
        // equal priorities the lower (earlier) sequence number pops first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<QueuedJob>>,
    has_work: Condvar,
    idle: Condvar,
    running: AtomicBool,
    next_seq: AtomicU64,
    in_flight: AtomicUsize,
}

impl Shared {
    fn queue_len_and_in_flight(&self) -> (usize, usize) {
        let queue = self.queue.lock();
        (queue.len(), self.in_flight.load(AtomicOrdering::SeqCst))
    }
}

/// A fixed-size [`ThreadPool`] backed by OS threads.
pub struct FixedThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl FixedThreadPool {
    /// Creates a pool with `size` workers. Workers are not spawned until
    /// [`FixedThreadPool::start`] is called.
    pub fn new(size: usize) -> Arc<Self> {
        let size = size.max(1);
        Arc::new(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(BinaryHeap::new()),
                has_work: Condvar::new(),
                idle: Condvar::new(),
                running: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::new()),
            size,
        })
    }

    /// Spawns the worker threads. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        if self.shared.running.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock();
        for _ in 0..self.size {
            let shared = Arc::clone(&self.shared);
            workers.push(thread::spawn(move || worker_loop(shared)));
        }
    }

    /// Stops accepting jobs not yet queued from running further, wakes
    /// workers, and joins them. Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, AtomicOrdering::SeqCst) {
            return;
        }
        self.shared.has_work.notify_all();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(queued) = queue.pop() {
                    break Some(queued.job);
                }
                if !shared.running.load(AtomicOrdering::SeqCst) {
                    break None;
                }
                shared.has_work.wait(&mut queue);
            }
        };
        let Some(job) = job else { break };
        shared.in_flight.fetch_add(1, AtomicOrdering::SeqCst);
        job();
        shared.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        let (queued, in_flight) = shared.queue_len_and_in_flight();
        if queued == 0 && in_flight == 0 {
            shared.idle.notify_all();
        }
    }
}

impl ThreadPool for FixedThreadPool {
    fn add_work(&self, job: Job, priority: Option<i32>) -> bool {
        if !self.shared.running.load(AtomicOrdering::SeqCst) {
            return false;
        }
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let mut queue = self.shared.queue.lock();
        queue.push(QueuedJob {
            priority: priority.unwrap_or(0),
            seq,
            job,
        });
        self.shared.has_work.notify_one();
        true
    }

    fn wait(&self) {
        let mut queue = self.shared.queue.lock();
        while !queue.is_empty() || self.shared.in_flight.load(AtomicOrdering::SeqCst) > 0 {
            self.shared.idle.wait(&mut queue);
        }
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn runs_all_posted_jobs() {
        let pool = FixedThreadPool::new(4);
        pool.start();
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.add_work(
                Box::new(move || {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                }),
                None,
            );
        }
        pool.wait();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 50);
        pool.stop();
    }

    #[test]
    fn wait_blocks_until_in_flight_drains() {
        let pool = FixedThreadPool::new(2);
        pool.start();
        let started = Arc::new(AtomicBool::new(false));
        let started2 = Arc::clone(&started);
        pool.add_work(
            Box::new(move || {
                started2.store(true, AtomicOrdering::SeqCst);
                thread::sleep(Duration::from_millis(100));
            }),
            None,
        );
        // give the worker a moment to pick it up
        thread::sleep(Duration::from_millis(20));
        assert!(started.load(AtomicOrdering::SeqCst));
        pool.wait();
        pool.stop();
    }

    #[test]
    fn add_work_after_stop_is_rejected() {
        let pool = FixedThreadPool::new(1);
        pool.start();
        pool.stop();
        assert!(!pool.add_work(Box::new(|| {}), None));
    }
}
