// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! A named registry that instantiates, lifecycles, and optionally
//! dynamically loads pluggable components from JSON configuration (spec C4).
//!
//! Grounded directly on `examples/original_source/src/c/container.c`:
//! declaration-order startup, reverse-declaration-order teardown, the
//! `IOT_COMPONENT_DELTA`-chunked vs one-at-a-time holder growth, and the
//! discovery-then-instantiation two-pass `init`. The process-wide registries
//! that file keeps as linked lists behind one mutex live in
//! [`registry`] here, as `once_cell::sync::Lazy` statics.

//! Dynamic loading (behind the `dynamic-load` feature) needs `unsafe` to
//! call into `libloading`; everything else in this crate forbids it, so
//! `unsafe_code` is denied here rather than forbidden and allowed back only
//! inside the [`dynamic`] module.
#![deny(unsafe_code)]

#[cfg(feature = "dynamic-load")]
mod dynamic;
pub mod registry;

use std::sync::Arc;

use parking_lot::RwLock;

/// Holder array growth chunk during `init` (spec §4.4, from the C reference's
/// `IOT_COMPONENT_DELTA`).
const COMPONENT_DELTA: usize = 4;

/// A component's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Initialized,
    Running,
    Stopped,
    Deleted,
}

/// The capability set every container-managed component exposes.
pub trait Component: Send + Sync {
    /// Starts the component. Returns `false` on failure; the container ANDs
    /// this across all holders in [`Container::start`].
    fn start(&self) -> bool;
    /// Stops the component.
    fn stop(&self) -> bool;
    /// The component's current lifecycle state.
    fn state(&self) -> ComponentState;
}

/// A named constructor turning a parsed config map into a [`Component`].
pub trait ComponentFactory: Send + Sync {
    /// The `type` string this factory is registered under.
    fn type_name(&self) -> &str;
    /// Builds a component from `config`. Returns `None` if construction
    /// fails; the holder is then never added (spec §4.4 `init`/`add_component`).
    fn build(
        &self,
        container: &Container,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<Arc<dyn Component>>;
}

/// Errors raised by container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// No configuration loader has been installed via [`registry::configure`].
    #[error("no configuration loader installed")]
    NoConfigLoader,
    /// The loader returned nothing for this container's own name.
    #[error("no configuration found for container {0:?}")]
    ConfigMissing(String),
    /// The configuration JSON failed to parse, or was not an object.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// No factory is registered for this type, and dynamic load (if enabled)
    /// did not produce one.
    #[error("no factory registered for type {0:?}")]
    UnknownFactory(String),
    /// No holder with this name exists.
    #[error("no component named {0:?}")]
    ComponentNotFound(String),
}

struct Holder {
    component: Arc<dyn Component>,
    type_name: String,
    name: String,
}

/// A named registry of components, instantiated from configuration in
/// declaration order and torn down in reverse.
pub struct Container {
    name: String,
    holders: RwLock<Vec<Holder>>,
    #[cfg(feature = "dynamic-load")]
    dl_handles: RwLock<Vec<libloading::Library>>,
}

impl Container {
    /// Creates a uniquely named container and links it into the global
    /// registry. Returns `None` if `name` is already in use.
    pub fn alloc(name: &str) -> Option<Arc<Self>> {
        let container = Arc::new(Self {
            name: name.to_string(),
            holders: RwLock::new(Vec::new()),
            #[cfg(feature = "dynamic-load")]
            dl_handles: RwLock::new(Vec::new()),
        });
        if registry::register_container(Arc::clone(&container)) {
            Some(container)
        } else {
            None
        }
    }

    /// This container's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads `self.name`'s own configuration (a map of `component_name ->
    /// component_type`, in declaration order) via the installed loader and
    /// instantiates every component it names (spec §4.4 `init`).
    pub fn init(self: &Arc<Self>) -> Result<(), ContainerError> {
        let config_json = registry::load_config(&self.name)
            .ok_or_else(|| ContainerError::ConfigMissing(self.name.clone()))?;
        let parsed: serde_json::Value = serde_json::from_str(&config_json)
            .map_err(|e| ContainerError::ConfigInvalid(e.to_string()))?;
        let declarations = parsed
            .as_object()
            .ok_or_else(|| ContainerError::ConfigInvalid("expected a JSON object".into()))?;

        #[cfg(feature = "dynamic-load")]
        {
            // Discovery pass: only entries whose factory is still unknown.
            // Iterating the map fresh here (rather than resuming a shared
            // iterator the instantiation pass below also advances) avoids
            // the latent skipped-entries bug the C reference has.
            for (cname, ctype) in declarations.iter() {
                let ctype = ctype.as_str().unwrap_or_default();
                if registry::find_factory(ctype).is_none() {
                    if let Some(component_json) = registry::load_config(cname) {
                        dynamic::try_load_component(self, &component_json);
                    }
                }
            }
        }

        self.holders.write().reserve(declarations.len());
        for (cname, ctype) in declarations.iter() {
            let Some(ctype) = ctype.as_str() else {
                log::warn!("container {:?}: component {cname:?} has a non-string type, skipped", self.name);
                continue;
            };
            let Some(factory) = registry::find_factory(ctype) else {
                log::warn!("container {:?}: no factory for type {ctype:?}, component {cname:?} skipped", self.name);
                continue;
            };
            let Some(component_json) = registry::load_config(cname) else {
                log::warn!("container {:?}: no configuration for component {cname:?}, skipped", self.name);
                continue;
            };
            self.instantiate(cname, ctype, &factory, &component_json, true);
        }
        Ok(())
    }

    fn instantiate(
        &self,
        name: &str,
        type_name: &str,
        factory: &Arc<dyn ComponentFactory>,
        config_json: &str,
        during_init: bool,
    ) {
        let parsed: serde_json::Value = match serde_json::from_str(config_json) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("container {:?}: component {name:?} config invalid: {e}", self.name);
                return;
            }
        };
        let Some(map) = parsed.as_object() else {
            log::warn!("container {:?}: component {name:?} config is not an object", self.name);
            return;
        };
        let Some(component) = factory.build(self, map) else {
            log::warn!("container {:?}: factory for type {type_name:?} declined to build {name:?}", self.name);
            return;
        };
        let mut holders = self.holders.write();
        grow_for_insert(&mut holders, during_init);
        holders.push(Holder {
            component,
            type_name: type_name.to_string(),
            name: name.to_string(),
        });
    }

    /// Runtime add outside of `init` (spec §4.4 `add_component`): resolves
    /// (optionally dynamically loading) the factory for `type_name`, builds
    /// the component from `config_json`, and appends a holder.
    pub fn add_component(
        self: &Arc<Self>,
        type_name: &str,
        name: &str,
        config_json: &str,
    ) -> Result<(), ContainerError> {
        let factory = match registry::find_factory(type_name) {
            Some(factory) => factory,
            None => {
                #[cfg(feature = "dynamic-load")]
                {
                    dynamic::try_load_component(self, config_json);
                }
                registry::find_factory(type_name)
                    .ok_or_else(|| ContainerError::UnknownFactory(type_name.to_string()))?
            }
        };
        self.instantiate(name, type_name, &factory, config_json, false);
        Ok(())
    }

    /// Starts every holder in declaration order (dependencies first).
    /// Returns the logical AND of every component's `start()`.
    pub fn start(&self) -> bool {
        let holders = self.holders.read();
        holders.iter().fold(true, |ok, h| ok & h.component.start())
    }

    /// Stops every holder in reverse declaration order (dependents last).
    pub fn stop(&self) {
        let holders = self.holders.read();
        for holder in holders.iter().rev() {
            holder.component.stop();
        }
    }

    /// Stops and removes the holder named `name`, compacting the array so
    /// declaration order of the remaining entries is preserved.
    pub fn delete_component(&self, name: &str) -> Result<(), ContainerError> {
        let mut holders = self.holders.write();
        let index = holders
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| ContainerError::ComponentNotFound(name.to_string()))?;
        if holders[index].component.state() != ComponentState::Stopped {
            holders[index].component.stop();
        }
        holders.remove(index);
        Ok(())
    }

    /// Finds a component by name under a read lock.
    pub fn find_component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.holders
            .read()
            .iter()
            .find(|h| h.name == name)
            .map(|h| Arc::clone(&h.component))
    }

    /// A snapshot of `(name, type, state)` for every holder, in declaration
    /// order.
    pub fn list_components(&self) -> Vec<(String, String, ComponentState)> {
        self.holders
            .read()
            .iter()
            .map(|h| (h.name.clone(), h.type_name.clone(), h.component.state()))
            .collect()
    }

    /// Stops every component, releases holders and dynamic-library handles,
    /// and deregisters this container.
    pub fn free(self: Arc<Self>) {
        self.stop();
        self.holders.write().clear();
        #[cfg(feature = "dynamic-load")]
        self.dl_handles.write().clear();
        registry::remove_container(&self.name);
    }

    #[cfg(feature = "dynamic-load")]
    pub(crate) fn retain_library(&self, lib: libloading::Library) {
        self.dl_handles.write().push(lib);
    }
}

fn grow_for_insert(holders: &mut Vec<Holder>, during_init: bool) {
    if holders.len() == holders.capacity() {
        let extra = if during_init { COMPONENT_DELTA } else { 1 };
        holders.reserve(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    // The container/factory registries and the config loader slot are
    // process-wide statics (spec §3 "Global process state"); serialize tests
    // that touch them so one test's `registry::configure` can't clobber
    // another's mid-`init`.
    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct RecordingComponent {
        started: AtomicBool,
        stopped: AtomicBool,
    }
    impl Component for RecordingComponent {
        fn start(&self) -> bool {
            self.started.store(true, Ordering::SeqCst);
            true
        }
        fn stop(&self) -> bool {
            self.stopped.store(true, Ordering::SeqCst);
            true
        }
        fn state(&self) -> ComponentState {
            if self.stopped.load(Ordering::SeqCst) {
                ComponentState::Stopped
            } else if self.started.load(Ordering::SeqCst) {
                ComponentState::Running
            } else {
                ComponentState::Initialized
            }
        }
    }

    struct RecordingFactory;
    impl ComponentFactory for RecordingFactory {
        fn type_name(&self) -> &str {
            "Recording"
        }
        fn build(
            &self,
            _container: &Container,
            _config: &serde_json::Map<String, serde_json::Value>,
        ) -> Option<Arc<dyn Component>> {
            Some(Arc::new(RecordingComponent {
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }))
        }
    }

    fn loader_for(entries: &'static [(&'static str, &'static str)]) -> registry::ConfigLoaderFn {
        Arc::new(move |name, _uri| {
            entries
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, json)| json.to_string())
        })
    }

    #[test]
    fn init_instantiates_in_declaration_order_and_start_stop_are_ordered() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        registry::register_factory(Arc::new(RecordingFactory));
        registry::configure(
            loader_for(&[
                ("lifecycle-test", r#"{"a": "Recording", "b": "Recording"}"#),
                ("a", "{}"),
                ("b", "{}"),
            ]),
            "mem://",
        );

        let container = Container::alloc("lifecycle-test").unwrap();
        container.init().unwrap();
        let names: Vec<String> = container
            .list_components()
            .into_iter()
            .map(|(n, _, _)| n)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        assert!(container.start());
        container.stop();

        Arc::clone(&container).free();
        assert!(registry::find_container("lifecycle-test").is_none());
    }

    #[test]
    fn unknown_factory_type_is_skipped_not_fatal() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        registry::configure(
            loader_for(&[("unknown-type-test", r#"{"x": "DoesNotExist"}"#)]),
            "mem://",
        );
        let container = Container::alloc("unknown-type-test").unwrap();
        container.init().unwrap();
        assert!(container.list_components().is_empty());
        Arc::clone(&container).free();
    }

    #[test]
    fn delete_component_compacts_holders() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        registry::register_factory(Arc::new(RecordingFactory));
        registry::configure(
            loader_for(&[
                ("delete-test", r#"{"a": "Recording", "b": "Recording", "c": "Recording"}"#),
                ("a", "{}"),
                ("b", "{}"),
                ("c", "{}"),
            ]),
            "mem://",
        );
        let container = Container::alloc("delete-test").unwrap();
        container.init().unwrap();
        container.delete_component("b").unwrap();
        let names: Vec<String> = container
            .list_components()
            .into_iter()
            .map(|(n, _, _)| n)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
        Arc::clone(&container).free();
    }

    #[test]
    fn duplicate_alloc_returns_none() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let first = Container::alloc("dup-alloc-test").unwrap();
        assert!(Container::alloc("dup-alloc-test").is_none());
        first.free();
    }
}
