// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! An in-process topic pub/sub bus (spec C3), fanned out synchronously or
//! via the thread pool, with its producer callbacks driven by a
//! [`scheduler::Scheduler`].
//!
//! Grounded on `examples/original_source/src/c/zephyr/broker/broker.c` for
//! the overall shape (a bus owning a scheduler-driven producer per
//! publisher) and on `samgr`'s `parking_lot::Mutex`-guarded registry for the
//! subscription/publisher bookkeeping style.

#![forbid(unsafe_code)]

mod topic;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use runtime_value::Value;
use scheduler::{Scheduler, ScheduleHandle};
use threadpool::ThreadPool;

/// Default producer cadence when the config JSON omits `Interval`: one second.
const DEFAULT_INTERVAL_NS: u64 = 1_000_000_000;

/// A subscriber callback: receives the topic it matched on and the payload.
pub type SubscriberFn = Arc<dyn Fn(&str, Value) + Send + Sync>;

/// A producer callback invoked on the configured cadence; `None` means
/// "nothing to publish this tick" (spec §4.3 "Producer cadence").
pub type ProducerFn = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Errors raised by bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The `init` JSON was not an object, or a recognized field had the
    /// wrong type.
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),
    /// A subscription pattern violated the `#`-must-be-final-segment grammar.
    #[error("invalid topic pattern: {0}")]
    InvalidPattern(String),
    /// A publisher's own topic contained a wildcard segment.
    #[error("publisher topic must be literal: {0}")]
    NonLiteralTopic(String),
    /// Failed to create the producer's recurring schedule.
    #[error(transparent)]
    Scheduler(#[from] scheduler::SchedulerError),
}

struct SubscriptionInner {
    pattern: String,
    callback: SubscriberFn,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// A live registration returned by [`Bus::sub_alloc`]. Drop alone does not
/// deregister it — pass it to [`Bus::sub_free`].
pub struct Subscription(Arc<SubscriptionInner>);

struct PublisherInner {
    topic: String,
    priority: Option<i32>,
    producer_schedule: Mutex<Option<ScheduleHandle>>,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// A live registration returned by [`Bus::pub_alloc`].
pub struct Publisher(Arc<PublisherInner>);

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Arc<SubscriptionInner>>,
    publishers: Vec<Arc<PublisherInner>>,
    topic_priority: HashMap<String, i32>,
}

/// The pub/sub bus itself: owns the subscription/publisher registries and
/// handles to the scheduler and thread pool that drive producer cadence and
/// asynchronous delivery.
pub struct Bus {
    scheduler: Arc<Scheduler>,
    pool: Arc<dyn ThreadPool>,
    state: Mutex<BusState>,
    interval_ns: AtomicU64,
}

impl Bus {
    /// Creates a bus with no subscriptions or publishers, wired to `scheduler`
    /// for producer cadence and `pool` for asynchronous delivery. Call
    /// [`Bus::init`] to load configuration before use.
    pub fn new(scheduler: Arc<Scheduler>, pool: Arc<dyn ThreadPool>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            pool,
            state: Mutex::new(BusState::default()),
            interval_ns: AtomicU64::new(DEFAULT_INTERVAL_NS),
        })
    }

    /// Parses the bus configuration JSON (spec §6 "Bus configuration JSON"):
    /// `Interval` (default producer cadence, ns), `Threads` (informational —
    /// the pool is constructed and sized by the caller, not here), and
    /// `Topics` (per-topic dispatch priorities). Unknown keys are ignored.
    pub fn init(&self, config_json: &str) -> Result<(), BusError> {
        let parsed: serde_json::Value = serde_json::from_str(config_json)
            .map_err(|e| BusError::InvalidConfig(e.to_string()))?;
        let obj = parsed
            .as_object()
            .ok_or_else(|| BusError::InvalidConfig("expected a JSON object".into()))?;

        if let Some(interval) = obj.get("Interval") {
            let ns = interval
                .as_u64()
                .ok_or_else(|| BusError::InvalidConfig("Interval must be a uint64".into()))?;
            self.interval_ns.store(ns, Ordering::SeqCst);
        }
        if let Some(threads) = obj.get("Threads") {
            let _ = threads
                .as_u64()
                .ok_or_else(|| BusError::InvalidConfig("Threads must be a uint32".into()))?;
            log::debug!("bus config named a pool size; the pool is owned by the caller");
        }
        if let Some(topics) = obj.get("Topics") {
            let topics = topics
                .as_array()
                .ok_or_else(|| BusError::InvalidConfig("Topics must be an array".into()))?;
            let mut state = self.state.lock();
            for entry in topics {
                let topic = entry
                    .get("Topic")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| BusError::InvalidConfig("Topics[].Topic missing".into()))?;
                let priority = entry.get("Priority").and_then(|p| p.as_i64()).unwrap_or(0) as i32;
                state.topic_priority.insert(topic.to_string(), priority);
            }
        }
        Ok(())
    }

    /// Starts the embedded scheduler so producer cadences begin firing.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stops the embedded scheduler, draining in-flight producer firings.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Registers a subscriber for `pattern` (spec §4.3 grammar: `+` single
    /// segment, trailing `#` multi-segment, exact otherwise).
    pub fn sub_alloc(
        self: &Arc<Self>,
        pattern: &str,
        callback: SubscriberFn,
    ) -> Result<Subscription, BusError> {
        if !topic::is_valid_pattern(pattern) {
            return Err(BusError::InvalidPattern(pattern.to_string()));
        }
        let inner = Arc::new(SubscriptionInner {
            pattern: pattern.to_string(),
            callback,
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        });
        self.state.lock().subscriptions.push(Arc::clone(&inner));
        Ok(Subscription(inner))
    }

    /// Deregisters `sub` and blocks until any dispatch already in flight for
    /// it has finished (spec §5 "sub_free deregisters atomically with any
    /// in-flight dispatch").
    pub fn sub_free(&self, sub: Subscription) {
        {
            let mut state = self.state.lock();
            state
                .subscriptions
                .retain(|existing| !Arc::ptr_eq(existing, &sub.0));
        }
        let mut in_flight = sub.0.in_flight.lock();
        while *in_flight != 0 {
            sub.0.drained.wait(&mut in_flight);
        }
    }

    /// Registers a publisher on `topic` (which must contain no wildcard
    /// segments). If `producer` is `Some`, schedules a recurring job at the
    /// configured `Interval` that invokes it and publishes any non-`None`
    /// result asynchronously.
    pub fn pub_alloc(
        self: &Arc<Self>,
        topic: &str,
        producer: Option<ProducerFn>,
    ) -> Result<Publisher, BusError> {
        if !topic::is_literal_topic(topic) {
            return Err(BusError::NonLiteralTopic(topic.to_string()));
        }
        let priority = self.state.lock().topic_priority.get(topic).copied();
        let inner = Arc::new(PublisherInner {
            topic: topic.to_string(),
            priority,
            producer_schedule: Mutex::new(None),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        });
        self.state.lock().publishers.push(Arc::clone(&inner));
        let publisher = Publisher(inner);

        if let Some(producer) = producer {
            let bus = Arc::clone(self);
            let inner_for_job = Arc::clone(&publisher.0);
            let period = Duration::from_nanos(self.interval_ns.load(Ordering::SeqCst));
            let handle = bus.scheduler.schedule_create(
                move || {
                    if let Some(payload) = (*producer)() {
                        bus.publish(&Publisher(Arc::clone(&inner_for_job)), payload, false);
                    }
                },
                period,
                Duration::ZERO,
                0,
                priority,
            )?;
            bus.scheduler.schedule_add(&handle);
            *publisher.0.producer_schedule.lock() = Some(handle);
        }
        Ok(publisher)
    }

    /// Cancels any recurring producer schedule, deregisters `publisher`, and
    /// waits for in-flight dispatches of its publications to finish.
    pub fn pub_free(&self, publisher: Publisher) {
        if let Some(handle) = publisher.0.producer_schedule.lock().take() {
            self.scheduler.schedule_remove(&handle);
            self.scheduler.schedule_delete(handle);
        }
        {
            let mut state = self.state.lock();
            state
                .publishers
                .retain(|existing| !Arc::ptr_eq(existing, &publisher.0));
        }
        let mut in_flight = publisher.0.in_flight.lock();
        while *in_flight != 0 {
            publisher.0.drained.wait(&mut in_flight);
        }
    }

    /// Fans `payload` out to every subscription whose pattern matches
    /// `publisher`'s topic. `sync` delivers on the caller's thread; otherwise
    /// the whole fan-out for this publication is posted as one job to the
    /// pool, which preserves per-publisher publish-order (spec §5
    /// "Ordering guarantees") without serializing the caller.
    pub fn publish(&self, publisher: &Publisher, payload: Value, sync: bool) {
        // Reserve every matched subscriber's and the publisher's own in-flight
        // slot while still holding `state`, so a concurrent `sub_free`/
        // `pub_free` either sees the reservation (and waits for it) or sees
        // the subscriber/publisher already removed (and is never raced by a
        // dispatch it didn't know about).
        let matching: Vec<Arc<SubscriptionInner>> = {
            let state = self.state.lock();
            let matching: Vec<Arc<SubscriptionInner>> = state
                .subscriptions
                .iter()
                .filter(|s| topic::matches(&s.pattern, &publisher.topic))
                .cloned()
                .collect();
            for sub in &matching {
                *sub.in_flight.lock() += 1;
            }
            *publisher.0.in_flight.lock() += 1;
            matching
        };

        if sync {
            for sub in &matching {
                dispatch_to_subscriber(sub, &publisher.0.topic, Value::clone(&payload));
            }
            finish_publisher_dispatch(&publisher.0);
        } else {
            let topic = publisher.0.topic.clone();
            let publisher_inner = Arc::clone(&publisher.0);
            self.pool.add_work(
                Box::new(move || {
                    for sub in &matching {
                        dispatch_to_subscriber(sub, &topic, Value::clone(&payload));
                    }
                    finish_publisher_dispatch(&publisher_inner);
                }),
                publisher.0.priority,
            );
        }
    }
}

fn dispatch_to_subscriber(sub: &Arc<SubscriptionInner>, topic: &str, payload: Value) {
    // `in_flight` was already incremented under the bus lock by `publish`;
    // this call only owns the matching decrement.
    let callback = Arc::clone(&sub.callback);
    let topic_owned = topic.to_string();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*callback)(&topic_owned, payload))) {
        log::warn!(
            "subscriber callback for pattern {:?} panicked: {:?}",
            sub.pattern,
            panic_message(&panic)
        );
    }
    let mut in_flight = sub.in_flight.lock();
    *in_flight -= 1;
    if *in_flight == 0 {
        sub.drained.notify_all();
    }
}

fn finish_publisher_dispatch(publisher: &Arc<PublisherInner>) {
    let mut in_flight = publisher.in_flight.lock();
    *in_flight -= 1;
    if *in_flight == 0 {
        publisher.drained.notify_all();
    }
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
