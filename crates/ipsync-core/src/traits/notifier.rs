// # Notifier Trait
//
// Defines the interface for telling an operator that the public address
// changed.
//
// ## Implementations
//
// - SMTP relay: `ipsync-notify-smtp` crate
// - HTTP webhook: `ipsync-notify-webhook` crate
// - Log only: `LogNotifier` in this module
//
// Delivery is retried by the loop through `RetryRunner`; a notifier makes a
// single attempt per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::address::PublicAddress;

/// Message describing an address change
///
/// Derived from the change the loop detected; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Previously recorded address (`None` on first run)
    pub previous: Option<PublicAddress>,
    /// Newly confirmed address
    pub current: PublicAddress,
    /// When the loop detected the change
    pub detected_at: DateTime<Utc>,
}

impl NotificationMessage {
    /// Create a message for a change detected now
    pub fn new(previous: Option<PublicAddress>, current: PublicAddress) -> Self {
        Self {
            previous,
            current,
            detected_at: Utc::now(),
        }
    }

    /// One-line subject
    pub fn subject(&self) -> String {
        format!("Public address changed to {}", self.current)
    }

    /// Human-readable body
    pub fn body(&self) -> String {
        let detected = self.detected_at.format("%Y-%m-%d %H:%M:%S UTC");
        match self.previous {
            Some(previous) => format!(
                "The public address changed from {} to {} (detected {}).\n\
                 Dependent configuration files have been updated.",
                previous, self.current, detected
            ),
            None => format!(
                "The public address is {} (detected {}). No previous address was recorded.\n\
                 Dependent configuration files have been updated.",
                self.current, detected
            ),
        }
    }
}

/// Trait for notifier implementations
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed deliveries (owned by `RetryRunner`)
/// - ❌ Touch state or target files
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the message
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Delivered (accepted by the transport)
    /// - `Err(Error::Delivery)`: Transport or authentication failure
    async fn notify(&self, message: &NotificationMessage) -> Result<(), crate::Error>;

    /// Short name used in log fields
    fn notifier_name(&self) -> &'static str;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier instance from configuration
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}

/// Notifier that only writes the message to the operational log
///
/// For hosts where the log itself is the operator's channel.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), crate::Error> {
        tracing::info!(
            previous = %message.previous.map(|a| a.to_string()).unwrap_or_default(),
            current = %message.current,
            "{}",
            message.body()
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

/// Factory for [`LogNotifier`]
pub struct LogNotifierFactory;

impl NotifierFactory for LogNotifierFactory {
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error> {
        match config {
            crate::config::NotifierConfig::Log => Ok(Box::new(LogNotifier)),
            _ => Err(crate::Error::config("Invalid config for log notifier")),
        }
    }
}
