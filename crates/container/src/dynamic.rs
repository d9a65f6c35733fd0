// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dynamic component loading (spec §4.4 "Dynamic loading"), feature-gated
//! behind `dynamic-load` per spec §9 ("keep dynamic-load capability behind a
//! compile/feature flag; the core must be usable without it").
//!
//! Stands in for the C reference's raw `dlopen(library, RTLD_LAZY)` +
//! `dlsym(handle, factory)` with `libloading`, the crate the wider example
//! pack reaches for to do the same thing.

#![allow(unsafe_code)]

use std::sync::Arc;

use libloading::Library;

use crate::{registry, Container, ComponentFactory};

/// The symbol named by a component's `Factory` field: a nullary function
/// returning the factory it registers.
type FactoryConstructor = unsafe extern "C" fn() -> Arc<dyn ComponentFactory>;

/// Reads `Library`/`Factory` out of `config_json`; if both are present,
/// opens `Library` with lazy binding, resolves `Factory`, registers the
/// returned factory, and retains the library handle on `container` so it is
/// closed when the container is freed. Any failure (missing fields, open
/// failure, missing symbol) is logged and otherwise ignored, per spec §7
/// ("Dynamic load failure... Logged; entry skipped; handle closed").
pub(crate) fn try_load_component(container: &Container, config_json: &str) {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(config_json) else {
        return;
    };
    let Some(obj) = parsed.as_object() else {
        return;
    };
    let (Some(library_path), Some(factory_symbol)) = (
        obj.get("Library").and_then(|v| v.as_str()),
        obj.get("Factory").and_then(|v| v.as_str()),
    ) else {
        return;
    };

    let library = match unsafe { Library::new(library_path) } {
        Ok(lib) => lib,
        Err(e) => {
            log::error!("could not dynamically load library {library_path:?}: {e}");
            return;
        }
    };

    let constructor = match unsafe { library.get::<FactoryConstructor>(factory_symbol.as_bytes()) }
    {
        Ok(sym) => sym,
        Err(e) => {
            log::error!(
                "could not find factory symbol {factory_symbol:?} in library {library_path:?}: {e}"
            );
            return;
        }
    };

    let factory = unsafe { constructor() };
    if registry::register_factory(factory) {
        container.retain_library(library);
    }
}
