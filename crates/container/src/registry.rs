// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide container registry, factory registry, and config loader slot
//! (spec §3 "Global process state"). The C reference keeps these as two
//! module-scope linked lists behind one mutex, lazily initialized; here they
//! are `once_cell::sync::Lazy` statics guarded by `parking_lot::Mutex`, with
//! no `static mut` anywhere.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{Container, ComponentFactory};

/// A capability `(component_name, uri) -> json`, stashed process-wide for
/// convenience per spec §9 ("Configuration callback... the reference stashes
/// it in a process-wide slot; this is a non-essential choice").
pub type ConfigLoaderFn = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

struct GlobalConfig {
    loader: ConfigLoaderFn,
    uri: String,
}

static FACTORIES: Lazy<Mutex<HashMap<String, Arc<dyn ComponentFactory>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static CONTAINERS: Lazy<Mutex<Vec<Arc<Container>>>> = Lazy::new(|| Mutex::new(Vec::new()));

static CONFIG: Lazy<Mutex<Option<GlobalConfig>>> = Lazy::new(|| Mutex::new(None));

/// Installs the process-wide configuration loader (spec §4.4 `config`).
pub fn configure(loader: ConfigLoaderFn, uri: impl Into<String>) {
    *CONFIG.lock() = Some(GlobalConfig {
        loader,
        uri: uri.into(),
    });
}

/// Fetches `name`'s own configuration JSON via the installed loader, if any.
pub fn load_config(name: &str) -> Option<String> {
    let guard = CONFIG.lock();
    let config = guard.as_ref()?;
    (config.loader)(name, &config.uri)
}

/// Registers `factory` under its `type_name`. Returns `false` (silently, per
/// spec §7 "Duplicate container or factory name") if that type is already
/// registered.
pub fn register_factory(factory: Arc<dyn ComponentFactory>) -> bool {
    let mut factories = FACTORIES.lock();
    let type_name = factory.type_name().to_string();
    if factories.contains_key(&type_name) {
        false
    } else {
        factories.insert(type_name, factory);
        true
    }
}

/// Looks up the factory registered for `type_name`, if any.
pub fn find_factory(type_name: &str) -> Option<Arc<dyn ComponentFactory>> {
    FACTORIES.lock().get(type_name).cloned()
}

/// Registers `container` under its name. Returns `false` if the name is
/// already taken (spec §4.4 "Duplicate name returns nothing").
pub fn register_container(container: Arc<Container>) -> bool {
    let mut containers = CONTAINERS.lock();
    if containers.iter().any(|c| c.name() == container.name()) {
        false
    } else {
        containers.push(container);
        true
    }
}

/// Looks up a registered container by name.
pub fn find_container(name: &str) -> Option<Arc<Container>> {
    CONTAINERS.lock().iter().find(|c| c.name() == name).cloned()
}

/// Removes `name` from the registry (called from [`crate::Container::free`]).
pub fn remove_container(name: &str) {
    CONTAINERS.lock().retain(|c| c.name() != name);
}

/// A snapshot of every registered container, indexed by insertion order
/// (spec §4.4 `list_containers`).
pub fn list_containers() -> Vec<(usize, String)> {
    CONTAINERS
        .lock()
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.name().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, ComponentState};

    struct NoopComponent;
    impl Component for NoopComponent {
        fn start(&self) -> bool {
            true
        }
        fn stop(&self) -> bool {
            true
        }
        fn state(&self) -> ComponentState {
            ComponentState::Running
        }
    }

    struct NoopFactory;
    impl ComponentFactory for NoopFactory {
        fn type_name(&self) -> &str {
            "Noop"
        }
        fn build(
            &self,
            _container: &Container,
            _config: &serde_json::Map<String, serde_json::Value>,
        ) -> Option<Arc<dyn Component>> {
            Some(Arc::new(NoopComponent))
        }
    }

    #[test]
    fn duplicate_factory_type_is_rejected() {
        assert!(register_factory(Arc::new(NoopFactory)));
        assert!(!register_factory(Arc::new(NoopFactory)));
    }

    #[test]
    fn duplicate_container_name_is_rejected() {
        let a = Container::alloc("registry-dup-test").unwrap();
        assert!(Container::alloc("registry-dup-test").is_none());
        remove_container(a.name());
    }
}
