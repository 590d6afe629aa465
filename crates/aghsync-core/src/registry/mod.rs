//! Plugin-based client registry
//!
//! The registry maps client type names ("direct", "router") to factories so
//! the daemon can build the right [`ProtectionClient`] from an
//! [`EndpointConfig`] without hardcoded if-else chains.
//!
//! ## Registration
//!
//! Client crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In aghsync-client-direct
//! pub fn register(registry: &ClientRegistry) {
//!     registry.register_client("direct", Box::new(DirectClientFactory));
//! }
//! ```

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::traits::{ClientFactory, ProtectionClient};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

/// Registry of protection client factories
///
/// Uses interior mutability with RwLock, allowing concurrent reads and
/// exclusive writes.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Box<dyn ClientFactory>>>,
}

impl ClientRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Box<dyn ClientFactory>>> {
        self.clients.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a client factory under `name`
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_client(&self, name: impl Into<String>, factory: Box<dyn ClientFactory>) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.insert(name.into(), factory);
    }

    /// Create the client an endpoint asks for
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ProtectionClient>)`: Created client instance
    /// - `Err(Error)`: If the client type is not registered or creation fails
    pub fn create_client(&self, config: &EndpointConfig) -> Result<Box<dyn ProtectionClient>> {
        let client_type = config.client_type();
        let clients = self.read();

        let factory = clients
            .get(client_type)
            .ok_or_else(|| Error::config(format!("Unknown client type: {}", client_type)))?;

        factory.create(config)
    }

    /// List all registered client types
    pub fn list_clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a client type is registered
    pub fn has_client(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }
}
