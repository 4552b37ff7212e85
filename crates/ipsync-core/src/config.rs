//! Configuration types for ipsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::reconcile::{SubstitutionRule, TargetFile};

/// Default lookup endpoint (plain-text body containing the caller's address)
pub const DEFAULT_RESOLVER_URL: &str = "https://api.ipify.org";

/// Main ipsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Address resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// State store configuration
    pub state_store: StateStoreConfig,

    /// Files to rewrite when the address changes, in reconciliation order
    pub targets: Vec<TargetFile>,

    /// Optional loop settings
    #[serde(default)]
    pub engine: LoopConfig,
}

impl SyncConfig {
    /// Create a configuration with default resolver, notifier and loop settings
    pub fn new(state_store: StateStoreConfig, targets: Vec<TargetFile>) -> Self {
        Self {
            resolver: ResolverConfig::default(),
            notifier: NotifierConfig::default(),
            state_store,
            targets,
            engine: LoopConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.targets.is_empty() {
            return Err(crate::Error::config("No target files configured"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.rules.is_empty() {
                return Err(crate::Error::config(format!(
                    "Target file {} has no substitution rules",
                    target.path.display()
                )));
            }
            if !seen.insert(target.path.as_path()) {
                return Err(crate::Error::config(format!(
                    "Target file {} is configured more than once",
                    target.path.display()
                )));
            }
        }

        self.resolver.validate()?;
        self.notifier.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Address resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverConfig {
    /// HTTP lookup service returning the address as a plain-text body
    Http {
        /// Primary URL
        url: String,
        /// URLs tried in order when the primary fails
        #[serde(default)]
        fallback_urls: Vec<String>,
        /// Request timeout in seconds
        #[serde(default = "default_resolver_timeout_secs")]
        timeout_secs: u64,
        /// Address family to accept
        #[serde(default)]
        version: Option<IpVersion>,
    },

    /// Custom resolver
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ResolverConfig::Http {
                url,
                fallback_urls,
                timeout_secs,
                ..
            } => {
                for candidate in std::iter::once(url).chain(fallback_urls) {
                    if candidate.is_empty() {
                        return Err(crate::Error::config("Resolver URL cannot be empty"));
                    }
                    if !candidate.starts_with("https://") && !candidate.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "Resolver URL must use HTTP or HTTPS scheme. Got: {}",
                            candidate
                        )));
                    }
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Resolver timeout must be > 0"));
                }
                Ok(())
            }
            ResolverConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom resolver factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the resolver type name
    pub fn type_name(&self) -> &str {
        match self {
            ResolverConfig::Http { .. } => "http",
            ResolverConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig::Http {
            url: DEFAULT_RESOLVER_URL.to_string(),
            fallback_urls: Vec::new(),
            timeout_secs: default_resolver_timeout_secs(),
            version: None,
        }
    }
}

/// IP version to accept from the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
    /// Both IPv4 and IPv6
    Both,
}

/// A secret value (password, token) that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value
    ///
    /// ⚠️ NEVER log the returned value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// TLS mode used to reach an SMTP relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// TLS from the first byte (SMTPS, usually port 465)
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    Starttls,
}

/// Notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// E-mail through an authenticated SMTP relay
    Smtp {
        /// Relay host name
        host: String,
        /// Relay port
        #[serde(default = "default_smtp_port")]
        port: u16,
        /// TLS mode
        #[serde(default)]
        tls: SmtpTls,
        /// Login user name
        username: String,
        /// Login password
        password: Secret,
        /// Sender mailbox
        from: String,
        /// Recipient mailboxes
        to: Vec<String>,
    },

    /// JSON POST to an HTTP endpoint
    Webhook {
        /// Endpoint URL
        url: String,
        /// Optional bearer token
        #[serde(default)]
        token: Option<Secret>,
    },

    /// Operational log only
    #[default]
    Log,

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Smtp {
                host,
                port,
                username,
                password,
                from,
                to,
                ..
            } => {
                if host.is_empty() {
                    return Err(crate::Error::config("SMTP host cannot be empty"));
                }
                if *port == 0 {
                    return Err(crate::Error::config("SMTP port must be > 0"));
                }
                if username.is_empty() || password.is_empty() {
                    return Err(crate::Error::config(
                        "SMTP username and password are required",
                    ));
                }
                if from.is_empty() {
                    return Err(crate::Error::config("SMTP sender cannot be empty"));
                }
                if to.is_empty() || to.iter().any(|r| r.is_empty()) {
                    return Err(crate::Error::config(
                        "SMTP needs at least one non-empty recipient",
                    ));
                }
                Ok(())
            }
            NotifierConfig::Webhook { url, .. } => {
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Webhook URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Ok(())
            }
            NotifierConfig::Log => Ok(()),
            NotifierConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom notifier factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Smtp { .. } => "smtp",
            NotifierConfig::Webhook { .. } => "webhook",
            NotifierConfig::Log => "log",
            NotifierConfig::Custom { factory, .. } => factory,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// Plain-text state file
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the state store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
        }
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Time between the end of one cycle and the start of the next (in seconds)
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Wait between attempts of a failed lookup or delivery (in seconds)
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Capacity of the loop event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl LoopConfig {
    /// Validate the loop configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.cycle_interval_secs == 0 {
            return Err(crate::Error::config("Cycle interval must be > 0"));
        }
        if self.retry_backoff_secs == 0 {
            return Err(crate::Error::config("Retry backoff must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Cycle interval as a [`Duration`]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Retry backoff as a [`Duration`]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Built-in target file presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPreset {
    /// PiVPN with OpenVPN: the PiVPN host setting and the client template
    PiVpn,
}

impl TargetPreset {
    /// Parse a preset name
    pub fn from_name(name: &str) -> Result<Self, crate::Error> {
        match name.to_lowercase().as_str() {
            "pivpn" => Ok(TargetPreset::PiVpn),
            other => Err(crate::Error::config(format!(
                "Unknown target preset '{}'. Supported presets: pivpn",
                other
            ))),
        }
    }

    /// Target files of the preset
    ///
    /// The PiVPN rules only recognise dotted IPv4 values.
    pub fn targets(&self) -> Result<Vec<TargetFile>, crate::Error> {
        match self {
            TargetPreset::PiVpn => Ok(vec![
                TargetFile::new(
                    "/etc/pivpn/setupVars.conf",
                    vec![SubstitutionRule::new(r"pivpnHOST=[\d\.]+", "pivpnHOST={new}")?],
                ),
                TargetFile::new(
                    "/etc/openvpn/easy-rsa/pki/Default.txt",
                    vec![SubstitutionRule::new(r"remote\s[\d\.]+\s", "remote {new} ")?],
                ),
            ]),
        }
    }
}

fn default_resolver_timeout_secs() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    465
}

fn default_cycle_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    64
}
