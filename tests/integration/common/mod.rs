#![allow(dead_code)]

use std::sync::Arc;

use freecloud::config::{AuthConfig, PersistenceConfig};
use freecloud::model::{User, UserId};
use freecloud::{Managers, PersistenceBackend, PluginRegistry, Result};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub config: PersistenceConfig,
    pub backend: Arc<dyn PersistenceBackend>,
    pub managers: Managers,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let config = PersistenceConfig::at(dir.path().join("graph.db"));
        let backend = PluginRegistry::with_defaults().initialize(&config)?;
        let managers = Managers::new(&*backend, AuthConfig::default());
        Ok(Self {
            dir,
            config,
            backend,
            managers,
        })
    }

    /// Registers a user with a root folder and returns its id.
    pub fn register(&self, email: &str) -> Result<UserId> {
        let (first, _) = email.split_once('@').unwrap_or((email, ""));
        let user = User::new(first, "Tester", email, "$argon2id$stub");
        let (user, _session) = self.managers.auth.create_user(user)?;
        Ok(user.id)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        PluginRegistry::shutdown(&*self.backend);
    }
}
