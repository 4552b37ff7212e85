//! Core traits for ipsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressResolver`]: Discover the current public address
//! - [`StateStore`]: Persist the last confirmed address
//! - [`Notifier`]: Tell an operator about a change

pub mod address_resolver;
pub mod notifier;
pub mod state_store;

pub use address_resolver::{AddressResolver, AddressResolverFactory};
pub use notifier::{LogNotifier, LogNotifierFactory, NotificationMessage, Notifier, NotifierFactory};
pub use state_store::{StateStore, StateStoreFactory};
