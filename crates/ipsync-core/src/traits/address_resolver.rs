// # Address Resolver Trait
//
// Defines the interface for discovering the host's current public address.
//
// ## Implementations
//
// - HTTP lookup services: `ipsync-resolver-http` crate
// - Future: STUN, UPnP gateway queries, DNS-based lookups (e.g. OpenDNS myip)
//
// ## Usage
//
// ```rust,ignore
// use ipsync_core::AddressResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* AddressResolver implementation */;
//
//     let address = resolver.resolve().await?;
//     println!("public address: {}", address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::address::PublicAddress;

/// Trait for address resolver implementations
///
/// A resolver answers a single question: what is the host's public address
/// right now? It must not cache answers; every call performs a fresh lookup.
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed lookups (owned by `RetryRunner`, driven by the loop)
/// - ❌ Read or write the state store
/// - ❌ Decide whether a change happened (owned by `ReconciliationLoop`)
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Look up the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(PublicAddress)`: The validated current address
    /// - `Err(Error::Lookup)`: Source unreachable, non-success status, or a
    ///   body that is not a valid address
    async fn resolve(&self) -> Result<PublicAddress, crate::Error>;

    /// Short name used in log fields
    fn resolver_name(&self) -> &'static str;
}

/// Helper trait for constructing resolvers from configuration
pub trait AddressResolverFactory: Send + Sync {
    /// Create an AddressResolver instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Resolver configuration
    ///
    /// # Returns
    ///
    /// A boxed AddressResolver trait object
    fn create(
        &self,
        config: &crate::config::ResolverConfig,
    ) -> Result<Box<dyn AddressResolver>, crate::Error>;
}
