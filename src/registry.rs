//! Facade Registry
//!
//! Hands out one shared `KeyValueFacade` per registry. `FacadeRegistry::global()`
//! is the process-wide registry; local registries exist for wiring and tests.

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::config::Config;
use crate::facade::KeyValueFacade;

/// Process-wide registry, initialized on first access.
static GLOBAL_REGISTRY: OnceLock<FacadeRegistry> = OnceLock::new();

/// Lazily constructs a single facade and shares it.
#[derive(Default)]
pub struct FacadeRegistry {
    instance: OnceLock<Arc<KeyValueFacade>>,
}

impl FacadeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            instance: OnceLock::new(),
        }
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static FacadeRegistry {
        GLOBAL_REGISTRY.get_or_init(FacadeRegistry::new)
    }

    /// Returns the shared facade, building it with `init` on first access.
    ///
    /// `init` runs at most once even under concurrent callers; everyone
    /// receives the same `Arc`.
    pub fn get_or_init<F>(&self, init: F) -> Arc<KeyValueFacade>
    where
        F: FnOnce() -> KeyValueFacade,
    {
        self.instance
            .get_or_init(|| {
                info!("initializing shared store client");
                Arc::new(init())
            })
            .clone()
    }

    /// Returns the shared facade, connecting with `config` on first access.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_or_connect(&self, config: &Config) -> Arc<KeyValueFacade> {
        self.get_or_init(|| KeyValueFacade::connect(config))
    }

    /// Returns the facade if it has been created.
    pub fn get(&self) -> Option<Arc<KeyValueFacade>> {
        self.instance.get().cloned()
    }

    /// Shuts the shared facade down, if one exists. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        if let Some(facade) = self.get() {
            facade.shutdown().await;
        }
    }
}
