// # State Store Trait
//
// Defines the interface for persisting the last confirmed public address.
//
// ## Purpose
//
// The state store is what makes change detection possible across restarts:
// the loop compares every freshly resolved address with the value stored
// here, and only a difference triggers file edits and a notification.
//
// ## Implementations
//
// - File-based: plain-text file holding exactly the address
// - In-memory: for tests and embedded use
//
// ## Usage
//
// ```rust,ignore
// use ipsync_core::{PublicAddress, StateStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     // None on first run
//     let last = store.read_last().await?;
//
//     store.write_last(&PublicAddress::parse("1.2.3.4")?).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::address::PublicAddress;

/// Trait for state store implementations
///
/// # Durability
///
/// `write_last()` must not return before the value is durable; a reader must
/// never observe a truncated or partially written value.
///
/// ## Forbidden Capabilities
/// - ❌ Decide when to write (owned by `ReconciliationLoop`)
/// - ❌ Buffer writes behind the caller's back
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the last confirmed address
    ///
    /// # Returns
    ///
    /// - `Ok(Some(PublicAddress))`: The last confirmed address
    /// - `Ok(None)`: Nothing was ever recorded (first run)
    /// - `Err(Error::Storage)`: Unreadable or corrupted storage
    async fn read_last(&self) -> Result<Option<PublicAddress>, crate::Error>;

    /// Overwrite the last confirmed address
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The value is durable
    /// - `Err(Error::Storage)`: Write failure (disk full, permissions, ...)
    async fn write_last(&self, address: &PublicAddress) -> Result<(), crate::Error>;

    /// Forget the recorded address so the next read returns `None`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Cleared (or nothing was recorded)
    /// - `Err(Error::Storage)`: Storage error
    async fn clear(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    fn create(
        &self,
        config: &crate::config::StateStoreConfig,
    ) -> Result<Box<dyn StateStore>, crate::Error>;
}
