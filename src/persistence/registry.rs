//! Named backend registry.
//!
//! Backends register an initializer under a key; only the key selected by
//! configuration is ever initialised.

use super::PersistenceBackend;
use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Creates a ready-to-use backend from configuration.
pub type Initializer =
    Arc<dyn Fn(&PersistenceConfig) -> Result<Arc<dyn PersistenceBackend>> + Send + Sync>;

/// Lifecycle hooks of one backend. Closing goes through
/// [`PersistenceBackend::close`].
#[derive(Clone)]
pub struct PluginLifecycle {
    /// Called once when the backend is selected.
    pub initialize: Initializer,
}

impl PluginLifecycle {
    /// Wraps an initializer function.
    pub fn new<F>(initialize: F) -> Self
    where
        F: Fn(&PersistenceConfig) -> Result<Arc<dyn PersistenceBackend>> + Send + Sync + 'static,
    {
        Self {
            initialize: Arc::new(initialize),
        }
    }
}

/// Backends keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginLifecycle>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in SQLite graph backend under `"sqlite"`.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(crate::graph::BACKEND_NAME, crate::graph::lifecycle());
        registry
    }

    /// Adds or replaces the backend stored under `key`.
    pub fn register(&self, key: impl Into<String>, lifecycle: PluginLifecycle) {
        self.plugins.write().insert(key.into(), lifecycle);
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.plugins.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Initialises the backend named by `config.backend`.
    ///
    /// # Errors
    /// * `UnknownBackend` - nothing registered under that key
    /// * anything the initializer reports; callers treat it as fatal
    pub fn initialize(&self, config: &PersistenceConfig) -> Result<Arc<dyn PersistenceBackend>> {
        let lifecycle = self
            .plugins
            .read()
            .get(&config.backend)
            .cloned()
            .ok_or_else(|| PersistenceError::UnknownBackend(config.backend.clone()))?;
        let backend = (lifecycle.initialize)(config).map_err(|err| {
            error!(backend = %config.backend, error = %err, "persistence backend failed to initialise");
            err
        })?;
        info!(backend = %config.backend, "persistence backend initialised");
        Ok(backend)
    }

    /// Closes `backend`. Failures are logged and swallowed.
    pub fn shutdown(backend: &dyn PersistenceBackend) {
        match backend.close() {
            Ok(()) => info!(backend = backend.name(), "persistence backend closed"),
            Err(err) => error!(backend = backend.name(), error = %err, "failed to close persistence backend"),
        }
    }
}
