// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Registers the [`scheduler::Scheduler`] and [`bus::Bus`] subsystems as
//! `container::Component`s, so a JSON-driven `Container` can instantiate
//! either by name (spec §2 "among those components are Scheduler and Bus
//! instances").
//!
//! Grounded on `examples/original_source/src/c/container.c`'s concrete
//! components registering themselves with the global factory list at
//! process start; here that is [`install_builtin_factories`], called once
//! by whatever binary assembles a runtime.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bus::Bus;
use container::{Component, ComponentFactory, ComponentState, Container};
use scheduler::Scheduler;
use threadpool::{FixedThreadPool, ThreadPool};

/// `Threads` falls back to this pool size if the component config omits it.
const DEFAULT_POOL_THREADS: usize = 4;

/// Wraps a [`Scheduler`] as a container-managed component.
pub struct SchedulerComponent {
    scheduler: Arc<Scheduler>,
    running: AtomicBool,
}

impl SchedulerComponent {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            running: AtomicBool::new(false),
        }
    }

    /// Exposes the wrapped scheduler, e.g. so a sibling component can create
    /// schedules on it.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }
}

impl Component for SchedulerComponent {
    fn start(&self) -> bool {
        self.scheduler.start();
        self.running.store(true, Ordering::SeqCst);
        true
    }

    fn stop(&self) -> bool {
        self.scheduler.stop();
        self.running.store(false, Ordering::SeqCst);
        true
    }

    fn state(&self) -> ComponentState {
        if self.running.load(Ordering::SeqCst) {
            ComponentState::Running
        } else {
            ComponentState::Stopped
        }
    }
}

/// Wraps a [`Bus`] as a container-managed component.
pub struct BusComponent {
    bus: Arc<Bus>,
    running: AtomicBool,
}

impl BusComponent {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self {
            bus,
            running: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> Arc<Bus> {
        Arc::clone(&self.bus)
    }
}

impl Component for BusComponent {
    fn start(&self) -> bool {
        self.bus.start();
        self.running.store(true, Ordering::SeqCst);
        true
    }

    fn stop(&self) -> bool {
        self.bus.stop();
        self.running.store(false, Ordering::SeqCst);
        true
    }

    fn state(&self) -> ComponentState {
        if self.running.load(Ordering::SeqCst) {
            ComponentState::Running
        } else {
            ComponentState::Stopped
        }
    }
}

fn pool_size_from_config(config: &serde_json::Map<String, serde_json::Value>) -> usize {
    config
        .get("Threads")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_POOL_THREADS)
}

/// Builds `"Scheduler"` components: a fresh [`FixedThreadPool`] sized by the
/// component's own `Threads` config key, with a [`Scheduler`] dispatching
/// onto it.
pub struct SchedulerFactory;

impl ComponentFactory for SchedulerFactory {
    fn type_name(&self) -> &str {
        "Scheduler"
    }

    fn build(
        &self,
        _container: &Container,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<Arc<dyn Component>> {
        let pool = FixedThreadPool::new(pool_size_from_config(config));
        pool.start();
        let scheduler = Scheduler::new(pool as Arc<dyn ThreadPool>);
        Some(Arc::new(SchedulerComponent::new(scheduler)))
    }
}

/// Builds `"Bus"` components: a fresh pool and [`Scheduler`] of its own,
/// configured from the component's raw JSON via [`Bus::init`].
pub struct BusFactory;

impl ComponentFactory for BusFactory {
    fn type_name(&self) -> &str {
        "Bus"
    }

    fn build(
        &self,
        _container: &Container,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<Arc<dyn Component>> {
        let pool = FixedThreadPool::new(pool_size_from_config(config));
        pool.start();
        let scheduler = Scheduler::new(Arc::clone(&pool) as Arc<dyn ThreadPool>);
        let bus = Bus::new(scheduler, pool);

        let config_json = serde_json::Value::Object(config.clone()).to_string();
        if let Err(e) = bus.init(&config_json) {
            log::warn!("Bus component configuration rejected: {e}");
            return None;
        }
        Some(Arc::new(BusComponent::new(bus)))
    }
}

/// Registers the built-in `"Scheduler"` and `"Bus"` factories with the
/// process-wide container registry. Idempotent: a factory already
/// registered under the same type name is left in place (spec §7
/// "Duplicate container or factory name... silently ignored").
pub fn install_builtin_factories() {
    container::registry::register_factory(Arc::new(SchedulerFactory));
    container::registry::register_factory(Arc::new(BusFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn scheduler_component_reports_running_after_start() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let pool = FixedThreadPool::new(1);
        pool.start();
        let scheduler = Scheduler::new(pool as Arc<dyn ThreadPool>);
        let component = SchedulerComponent::new(scheduler);
        assert_eq!(component.state(), ComponentState::Stopped);
        assert!(component.start());
        assert_eq!(component.state(), ComponentState::Running);
        assert!(component.stop());
        assert_eq!(component.state(), ComponentState::Stopped);
    }

    #[test]
    fn install_builtin_factories_registers_scheduler_and_bus() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        install_builtin_factories();
        assert!(container::registry::find_factory("Scheduler").is_some());
        assert!(container::registry::find_factory("Bus").is_some());
    }

    #[test]
    fn bus_factory_builds_from_component_config() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        install_builtin_factories();
        let container = Container::alloc("runtime-bus-factory-test").unwrap();
        let factory = container::registry::find_factory("Bus").unwrap();
        let config: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"Interval": 1000000, "Threads": 2}"#).unwrap();
        let component = factory.build(&container, &config).unwrap();
        assert!(component.start());
        assert!(component.stop());
        Arc::clone(&container).free();
    }
}
