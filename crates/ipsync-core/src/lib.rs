// # ipsync-core
//
// Core library for keeping configuration files in sync with the host's
// public network address.
//
// ## Architecture Overview
//
// - **AddressResolver**: Trait for looking up the current public address
// - **StateStore**: Trait for remembering the last confirmed address
// - **TextReconciler**: Rewrites target files through substitution rules
// - **Notifier**: Trait for announcing a change to an operator
// - **RetryRunner**: Retries lookups and deliveries until they succeed
// - **ReconciliationLoop**: Orchestrates resolve → compare → rewrite → notify
// - **ComponentRegistry**: Plugin-based registry for resolvers and notifiers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from transports
// 2. **Plugin-Based**: Components are registered by name, no hard-coded if-else
// 3. **Library-First**: The daemon is a thin shell over this crate
// 4. **Idempotency**: Rewrites are anchored on structure and safe to repeat

pub mod address;
mod atomic;
pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use address::{AddressFamily, PublicAddress};
pub use config::{
    LoopConfig, NotifierConfig, ResolverConfig, StateStoreConfig, SyncConfig, TargetPreset,
};
pub use engine::{CycleOutcome, LoopEvent, ReconciliationLoop};
pub use error::{Error, Result};
pub use reconcile::{ReconcileReport, SubstitutionRule, TargetFile, TextReconciler};
pub use registry::ComponentRegistry;
pub use retry::{RetryRunner, Sleeper, TokioSleeper};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{AddressResolver, NotificationMessage, Notifier, StateStore};
