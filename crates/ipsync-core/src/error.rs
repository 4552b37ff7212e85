//! Error types for ipsync
//!
//! This module defines all error types used throughout the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ipsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ipsync
#[derive(Error, Debug)]
pub enum Error {
    /// The public address could not be looked up (transient)
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// The persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// A substitution rule matched nothing in its target file
    #[error("No match for pattern `{pattern}` in {}", path.display())]
    NoMatch {
        /// Target file the rule was applied to
        path: PathBuf,
        /// Source text of the pattern
        pattern: String,
    },

    /// A notification could not be delivered (transient)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// A value is not a valid network address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors outside of state handling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a "no match" error
    pub fn no_match(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::NoMatch {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Name of the component an error originates from, for log fields
    pub fn component(&self) -> &'static str {
        match self {
            Self::Lookup(_) | Self::InvalidAddress(_) => "resolver",
            Self::Storage(_) => "state_store",
            Self::NoMatch { .. } | Self::Io(_) => "reconciler",
            Self::Delivery(_) => "notifier",
            Self::Config(_) | Self::Json(_) => "config",
            Self::Other(_) => "other",
        }
    }
}
