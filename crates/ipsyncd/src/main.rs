// # ipsyncd - public address sync daemon
//
// The ipsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering resolvers and notifiers
// 4. Running the reconciliation loop until SIGTERM/SIGINT
//
// All reconciliation logic lives in ipsync-core; this binary only wires it up.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Resolver
// - `IPSYNC_RESOLVER_URL`: Lookup service (default https://api.ipify.org)
// - `IPSYNC_RESOLVER_FALLBACK_URLS`: Comma-separated fallback services
// - `IPSYNC_RESOLVER_TIMEOUT_SECS`: Request timeout (default 10)
// - `IPSYNC_IP_VERSION`: v4, v6 or both (default both)
//
// ### Targets
// - `IPSYNC_TARGETS_FILE`: JSON array of `{ "path", "rules": [{ "pattern", "template" }] }`
// - `IPSYNC_PRESET`: Built-in target set (pivpn)
//
// ### State Store
// - `IPSYNC_STATE_STORE_TYPE`: file or memory (default file)
// - `IPSYNC_STATE_PATH`: Path to the state file (for file store)
//
// ### Notifier
// - `IPSYNC_NOTIFIER_TYPE`: smtp, webhook or log (default log)
// - `IPSYNC_SMTP_HOST`, `IPSYNC_SMTP_PORT`, `IPSYNC_SMTP_TLS`, `IPSYNC_SMTP_USERNAME`,
//   `IPSYNC_SMTP_PASSWORD`, `IPSYNC_SMTP_FROM`, `IPSYNC_SMTP_TO`
// - `IPSYNC_WEBHOOK_URL`, `IPSYNC_WEBHOOK_TOKEN`
//
// ### Loop
// - `IPSYNC_CYCLE_INTERVAL_SECS`: Time between cycles (default 86400)
// - `IPSYNC_RETRY_BACKOFF_SECS`: Wait between failed attempts (default 60)
// - `IPSYNC_ONESHOT`: Run a single cycle and exit
// - `IPSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export IPSYNC_PRESET=pivpn
// export IPSYNC_STATE_PATH=/var/lib/ipsync/last_address
// export IPSYNC_NOTIFIER_TYPE=smtp
// export IPSYNC_SMTP_HOST=smtp.gmail.com
// export IPSYNC_SMTP_USERNAME=alerts@example.com
// export IPSYNC_SMTP_PASSWORD=app-password
// export IPSYNC_SMTP_FROM=alerts@example.com
// export IPSYNC_SMTP_TO=ops@example.com
//
// ipsyncd
// ```

use anyhow::{Context, Result};
use ipsync_core::config::{
    DEFAULT_RESOLVER_URL, IpVersion, LoopConfig, NotifierConfig, ResolverConfig, Secret, SmtpTls,
    StateStoreConfig, SyncConfig, TargetPreset,
};
use ipsync_core::{ComponentRegistry, CycleOutcome, ReconciliationLoop, TargetFile};
use std::env;
use std::future::Future;
use std::process::ExitCode;
use std::str::FromStr;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<IpsyncExitCode> for ExitCode {
    fn from(code: IpsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    resolver_url: String,
    resolver_fallback_urls: Vec<String>,
    resolver_timeout_secs: u64,
    ip_version: String,
    state_store_type: String,
    state_path: Option<String>,
    targets_file: Option<String>,
    preset: Option<String>,
    notifier_type: String,
    smtp_host: Option<String>,
    smtp_port: u16,
    smtp_tls: String,
    smtp_username: Option<String>,
    smtp_password: Option<Secret>,
    smtp_from: Option<String>,
    smtp_to: Vec<String>,
    webhook_url: Option<String>,
    webhook_token: Option<Secret>,
    cycle_interval_secs: u64,
    retry_backoff_secs: u64,
    oneshot: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            resolver_url: var("IPSYNC_RESOLVER_URL")
                .unwrap_or_else(|| DEFAULT_RESOLVER_URL.to_string()),
            resolver_fallback_urls: split_list(var("IPSYNC_RESOLVER_FALLBACK_URLS")),
            resolver_timeout_secs: parse_var(&var, "IPSYNC_RESOLVER_TIMEOUT_SECS", 10)?,
            ip_version: var("IPSYNC_IP_VERSION").unwrap_or_else(|| "both".to_string()),
            state_store_type: var("IPSYNC_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            state_path: var("IPSYNC_STATE_PATH"),
            targets_file: var("IPSYNC_TARGETS_FILE"),
            preset: var("IPSYNC_PRESET"),
            notifier_type: var("IPSYNC_NOTIFIER_TYPE").unwrap_or_else(|| "log".to_string()),
            smtp_host: var("IPSYNC_SMTP_HOST"),
            smtp_port: parse_var(&var, "IPSYNC_SMTP_PORT", 465)?,
            smtp_tls: var("IPSYNC_SMTP_TLS").unwrap_or_else(|| "implicit".to_string()),
            smtp_username: var("IPSYNC_SMTP_USERNAME"),
            smtp_password: var("IPSYNC_SMTP_PASSWORD").map(Secret::new),
            smtp_from: var("IPSYNC_SMTP_FROM"),
            smtp_to: split_list(var("IPSYNC_SMTP_TO")),
            webhook_url: var("IPSYNC_WEBHOOK_URL"),
            webhook_token: var("IPSYNC_WEBHOOK_TOKEN").map(Secret::new),
            cycle_interval_secs: parse_var(&var, "IPSYNC_CYCLE_INTERVAL_SECS", 24 * 60 * 60)?,
            retry_backoff_secs: parse_var(&var, "IPSYNC_RETRY_BACKOFF_SECS", 60)?,
            oneshot: parse_flag(&var, "IPSYNC_ONESHOT")?,
            log_level: var("IPSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the environment-level settings
    ///
    /// Component-level checks (URLs, SMTP fields, rules) happen in
    /// [`SyncConfig::validate`] once the configuration is assembled.
    fn validate(&self) -> Result<()> {
        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "IPSYNC_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        match self.notifier_type.as_str() {
            "log" => {}
            "smtp" if cfg!(feature = "smtp") => {}
            "webhook" if cfg!(feature = "webhook") => {}
            "smtp" | "webhook" => anyhow::bail!(
                "IPSYNC_NOTIFIER_TYPE '{}' is not compiled into this build",
                self.notifier_type
            ),
            _ => anyhow::bail!(
                "IPSYNC_NOTIFIER_TYPE '{}' is not supported. \
                Supported types: smtp, webhook, log",
                self.notifier_type
            ),
        }

        self.parsed_ip_version()?;
        self.parsed_smtp_tls()?;

        if self.targets_file.is_none() && self.preset.is_none() {
            anyhow::bail!(
                "No target files configured. Set IPSYNC_TARGETS_FILE to a JSON file \
                describing the targets, or IPSYNC_PRESET=pivpn"
            );
        }

        if self.state_store_type == "file" {
            let Some(path) = &self.state_path else {
                anyhow::bail!(
                    "IPSYNC_STATE_PATH is required when IPSYNC_STATE_STORE_TYPE=file. \
                    Set it via: export IPSYNC_STATE_PATH=/var/lib/ipsync/last_address"
                );
            };

            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "IPSYNC_STATE_PATH parent directory does not exist: {}. \
                        Create it first: sudo mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        if self.resolver_url.starts_with("http://") {
            eprintln!(
                "WARNING: IPSYNC_RESOLVER_URL uses HTTP (not HTTPS). \
                      Answers can be tampered with in transit. Consider using HTTPS."
            );
        }

        if self.cycle_interval_secs < 60 {
            anyhow::bail!(
                "IPSYNC_CYCLE_INTERVAL_SECS must be at least 60 seconds. Got: {}",
                self.cycle_interval_secs
            );
        }

        if self.retry_backoff_secs == 0 {
            anyhow::bail!("IPSYNC_RETRY_BACKOFF_SECS must be > 0");
        }

        self.parsed_log_level()?;

        Ok(())
    }

    fn parsed_ip_version(&self) -> Result<Option<IpVersion>> {
        match self.ip_version.to_lowercase().as_str() {
            "v4" | "ipv4" => Ok(Some(IpVersion::V4)),
            "v6" | "ipv6" => Ok(Some(IpVersion::V6)),
            "both" => Ok(None),
            _ => anyhow::bail!(
                "IPSYNC_IP_VERSION '{}' is not valid. Valid values: v4, v6, both",
                self.ip_version
            ),
        }
    }

    fn parsed_smtp_tls(&self) -> Result<SmtpTls> {
        match self.smtp_tls.to_lowercase().as_str() {
            "implicit" | "tls" => Ok(SmtpTls::Implicit),
            "starttls" => Ok(SmtpTls::Starttls),
            _ => anyhow::bail!(
                "IPSYNC_SMTP_TLS '{}' is not valid. Valid values: implicit, starttls",
                self.smtp_tls
            ),
        }
    }

    fn parsed_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "IPSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Assemble and validate the library configuration
    fn to_sync_config(&self) -> Result<SyncConfig> {
        let mut targets = Vec::new();

        if let Some(name) = &self.preset {
            targets.extend(TargetPreset::from_name(name)?.targets()?);
        }

        if let Some(path) = &self.targets_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read IPSYNC_TARGETS_FILE {}", path))?;
            let from_file: Vec<TargetFile> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid target description in {}", path))?;
            targets.extend(from_file);
        }

        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_path.clone().unwrap_or_default(),
            },
        };

        let config = SyncConfig {
            resolver: ResolverConfig::Http {
                url: self.resolver_url.clone(),
                fallback_urls: self.resolver_fallback_urls.clone(),
                timeout_secs: self.resolver_timeout_secs,
                version: self.parsed_ip_version()?,
            },
            notifier: self.notifier_config()?,
            state_store,
            targets,
            engine: LoopConfig {
                cycle_interval_secs: self.cycle_interval_secs,
                retry_backoff_secs: self.retry_backoff_secs,
                ..LoopConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn notifier_config(&self) -> Result<NotifierConfig> {
        match self.notifier_type.as_str() {
            "smtp" => Ok(NotifierConfig::Smtp {
                host: required(&self.smtp_host, "IPSYNC_SMTP_HOST")?,
                port: self.smtp_port,
                tls: self.parsed_smtp_tls()?,
                username: required(&self.smtp_username, "IPSYNC_SMTP_USERNAME")?,
                password: self
                    .smtp_password
                    .clone()
                    .context("IPSYNC_SMTP_PASSWORD is required when IPSYNC_NOTIFIER_TYPE=smtp")?,
                from: required(&self.smtp_from, "IPSYNC_SMTP_FROM")?,
                to: self.smtp_to.clone(),
            }),
            "webhook" => Ok(NotifierConfig::Webhook {
                url: required(&self.webhook_url, "IPSYNC_WEBHOOK_URL")?,
                token: self.webhook_token.clone(),
            }),
            _ => Ok(NotifierConfig::Log),
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .with_context(|| format!("{} is required for the selected notifier", name))
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

fn parse_flag<V>(var: &V, name: &str) -> Result<bool>
where
    V: Fn(&str) -> Option<String>,
{
    match var(name).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => anyhow::bail!("{} must be true or false. Got: {}", name, other),
    }
}

/// Map a daemon failure to an exit code
fn exit_code_for(e: &anyhow::Error) -> IpsyncExitCode {
    match e.downcast_ref::<ipsync_core::Error>() {
        Some(ipsync_core::Error::Config(_)) => IpsyncExitCode::ConfigError,
        _ => IpsyncExitCode::RuntimeError,
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    let sync_config = match config.to_sync_config() {
        Ok(sync_config) => sync_config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = config.parsed_log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    info!("Starting ipsyncd daemon");
    info!(
        targets = sync_config.targets.len(),
        notifier = sync_config.notifier.type_name(),
        state_store = sync_config.state_store.type_name(),
        "Configuration loaded"
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(sync_config, config.oneshot).await {
            Ok(()) => IpsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(sync_config: SyncConfig, oneshot_mode: bool) -> Result<()> {
    // Built-ins: log notifier, file and memory stores
    let registry = ComponentRegistry::new();

    ipsync_resolver_http::register(&registry);

    #[cfg(feature = "smtp")]
    {
        debug!("Registering SMTP notifier");
        ipsync_notify_smtp::register(&registry);
    }

    #[cfg(feature = "webhook")]
    {
        debug!("Registering webhook notifier");
        ipsync_notify_webhook::register(&registry);
    }

    let resolver = registry.create_resolver(&sync_config.resolver)?;
    let notifier = registry.create_notifier(&sync_config.notifier)?;
    let state_store = registry.create_state_store(&sync_config.state_store)?;

    for target in &sync_config.targets {
        info!(path = %target.path.display(), rules = target.rules.len(), "Managing target file");
    }

    let (engine, mut events) =
        ReconciliationLoop::new(resolver, state_store, notifier, sync_config)?;

    // Drain loop events so the channel never fills
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Loop event");
        }
    });

    if oneshot_mode {
        info!("Running a single cycle");
        return match engine.run_cycle().await? {
            CycleOutcome::Unchanged { address } => {
                info!(current = %address, "Nothing to do");
                Ok(())
            }
            CycleOutcome::Changed { current, .. } => {
                info!(current = %current, "Targets updated");
                Ok(())
            }
        };
    }

    let shutdown = shutdown_signal()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        let signal = shutdown.await;
        info!("Received shutdown signal: {}", signal);
        let _ = shutdown_tx.send(());
    });

    engine.run_with_shutdown(Some(shutdown_rx)).await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Install SIGTERM and SIGINT handlers
///
/// Handlers are installed before the returned future is polled, so a signal
/// arriving during startup is not lost.
///
/// # Returns
///
/// A future resolving to the name of the first signal received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    })
}
