// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple state store that doesn't persist across restarts.
// Useful for testing and for embedding ipsync in a host application that
// keeps its own state.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - First cycle after a restart is treated as a first run: every target
//   file is reconciled and one notification is sent

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::address::PublicAddress;
use crate::config::StateStoreConfig;
use crate::traits::state_store::{StateStore, StateStoreFactory};

/// In-memory state store implementation
///
/// Clones share the same underlying value.
///
/// # Example
///
/// ```rust,no_run
/// use ipsync_core::state::MemoryStateStore;
/// use ipsync_core::{PublicAddress, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     store.write_last(&PublicAddress::parse("1.2.3.4")?).await?;
///     assert_eq!(store.read_last().await?, Some(PublicAddress::parse("1.2.3.4")?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<PublicAddress>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds an address
    pub fn with_address(address: PublicAddress) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(address))),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_last(&self) -> Result<Option<PublicAddress>, Error> {
        Ok(*self.inner.read().await)
    }

    async fn write_last(&self, address: &PublicAddress) -> Result<(), Error> {
        *self.inner.write().await = Some(*address);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        *self.inner.write().await = None;
        Ok(())
    }
}

/// Factory for [`MemoryStateStore`]
pub struct MemoryStateStoreFactory;

impl StateStoreFactory for MemoryStateStoreFactory {
    fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::Memory => Ok(Box::new(MemoryStateStore::new())),
            _ => Err(Error::config("Invalid config for memory state store")),
        }
    }
}
