//! Plugin-based component registry
//!
//! The registry allows address resolvers, notifiers and state stores to be
//! registered dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipsync_core::registry::ComponentRegistry;
//! use ipsync_core::config::NotifierConfig;
//!
//! // Built-in "log" notifier and "file"/"memory" stores are pre-registered
//! let registry = ComponentRegistry::new();
//!
//! // Register plugins
//! registry.register_notifier("webhook", Box::new(WebhookNotifierFactory));
//!
//! // Create notifier from config
//! let config = NotifierConfig::Webhook { ... };
//! let notifier = registry.create_notifier(&config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations should register themselves during initialization:
//!
//! ```rust,ignore
//! // In ipsync-notify-webhook crate
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_notifier("webhook", Box::new(WebhookNotifierFactory));
//! }
//! ```

use crate::config::{NotifierConfig, ResolverConfig, StateStoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{AddressResolver, Notifier, StateStore};
use crate::traits::{AddressResolverFactory, LogNotifierFactory, NotifierFactory, StateStoreFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Component registry for plugin-based construction
///
/// The registry maintains maps of component type names to factory objects,
/// allowing dynamic instantiation from configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
pub struct ComponentRegistry {
    /// Registered address resolver factories
    resolvers: RwLock<HashMap<String, Box<dyn AddressResolverFactory>>>,

    /// Registered notifier factories
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<HashMap<String, Box<dyn StateStoreFactory>>>,
}

impl ComponentRegistry {
    /// Create a registry holding only the built-in components
    ///
    /// Built-ins: the `log` notifier and the `file` and `memory` state stores.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_notifier("log", Box::new(LogNotifierFactory));
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry
    }

    /// Create a registry with nothing registered
    pub fn empty() -> Self {
        Self {
            resolvers: RwLock::new(HashMap::new()),
            notifiers: RwLock::new(HashMap::new()),
            state_stores: RwLock::new(HashMap::new()),
        }
    }

    /// Register an address resolver factory
    ///
    /// # Parameters
    ///
    /// - `name`: Resolver type name (e.g., "http")
    /// - `factory`: Factory object for creating resolver instances
    pub fn register_resolver(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AddressResolverFactory>,
    ) {
        self.resolvers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a notifier factory
    ///
    /// # Parameters
    ///
    /// - `name`: Notifier type name (e.g., "smtp", "webhook")
    /// - `factory`: Factory object for creating notifier instances
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use ipsync_core::registry::ComponentRegistry;
    /// # use ipsync_core::traits::NotifierFactory;
    /// # struct MyFactory;
    /// # impl NotifierFactory for MyFactory {
    /// #     fn create(&self, config: &ipsync_core::config::NotifierConfig) -> ipsync_core::Result<Box<dyn ipsync_core::Notifier>> { unimplemented!() }
    /// # }
    /// let registry = ComponentRegistry::new();
    /// registry.register_notifier("pager", Box::new(MyFactory));
    /// ```
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        self.notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a state store factory
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StateStoreFactory>,
    ) {
        self.state_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create an address resolver from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn AddressResolver>)`: Created resolver instance
    /// - `Err(Error::Config)`: If resolver type is not registered or creation fails
    pub fn create_resolver(&self, config: &ResolverConfig) -> Result<Box<dyn AddressResolver>> {
        let resolver_type = config.type_name();
        let resolvers = self.resolvers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = resolvers
            .get(resolver_type)
            .ok_or_else(|| Error::config(format!("Unknown resolver type: {}", resolver_type)))?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let notifier_type = config.type_name();
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = notifiers
            .get(notifier_type)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", notifier_type)))?;

        factory.create(config)
    }

    /// Create a state store from configuration
    pub fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
        let store_type = config.type_name();
        let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);

        let factory = stores
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?;

        factory.create(config)
    }

    /// List all registered resolver types
    pub fn list_resolvers(&self) -> Vec<String> {
        let resolvers = self.resolvers.read().unwrap_or_else(PoisonError::into_inner);
        resolvers.keys().cloned().collect()
    }

    /// List all registered notifier types
    pub fn list_notifiers(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);
        notifiers.keys().cloned().collect()
    }

    /// List all registered state store types
    pub fn list_state_stores(&self) -> Vec<String> {
        let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a resolver type is registered
    pub fn has_resolver(&self, name: &str) -> bool {
        self.resolvers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        self.notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        self.state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
