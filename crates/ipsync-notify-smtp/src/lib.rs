// # SMTP Notifier
//
// Announces address changes by e-mail through an authenticated relay.
//
// ## Transport
//
// - `implicit` (default, port 465): TLS from the first byte
// - `starttls` (usually port 587): plain connection upgraded with STARTTLS
//
// Credentials always come from configuration. Mailboxes are parsed when the
// notifier is built, so a typo in an address fails at startup instead of on
// the first change.

use ipsync_core::ComponentRegistry;
use ipsync_core::config::{NotifierConfig, Secret, SmtpTls};
use ipsync_core::traits::{NotificationMessage, Notifier, NotifierFactory};
use ipsync_core::{Error, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP command timeout
const SMTP_TIMEOUT_SECS: u64 = 30;

/// Relay settings for [`SmtpNotifier`]
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: String,
    pub password: Secret,
    pub from: String,
    pub to: Vec<String>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// E-mail notifier
pub struct SmtpNotifier {
    host: String,
    port: u16,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl SmtpNotifier {
    /// Create a notifier for the given relay
    ///
    /// # Errors
    ///
    /// `Error::Config` when a mailbox does not parse, no recipient is given
    /// or the relay host is unusable.
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let from = parse_mailbox(&settings.from)?;
        let to = settings
            .to
            .iter()
            .map(|m| parse_mailbox(m))
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(Error::config("SMTP notifier needs at least one recipient"));
        }

        let builder = match settings.tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host),
            SmtpTls::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            }
        }
        .map_err(|e| Error::config(format!("Invalid SMTP relay {}: {}", settings.host, e)))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.expose().to_string(),
            ))
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
            .build();

        Ok(Self {
            host: settings.host,
            port: settings.port,
            from,
            to,
            transport,
        })
    }

    /// Build the e-mail for a notification
    pub fn build_message(&self, message: &NotificationMessage) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(message.body())
            .map_err(|e| Error::delivery(format!("Failed to build e-mail: {}", e)))
    }
}

fn parse_mailbox(text: &str) -> Result<Mailbox> {
    text.parse::<Mailbox>()
        .map_err(|e| Error::config(format!("Invalid mailbox '{}': {}", text, e)))
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<()> {
        let email = self.build_message(message)?;

        let response = self.transport.send(email).await.map_err(|e| {
            Error::delivery(format!(
                "SMTP delivery via {}:{} failed: {}",
                self.host, self.port, e
            ))
        })?;

        tracing::debug!(
            host = %self.host,
            code = %response.code(),
            recipients = self.to.len(),
            "E-mail notification accepted by relay"
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "smtp"
    }
}

/// Factory for creating SMTP notifiers
pub struct SmtpNotifierFactory;

impl NotifierFactory for SmtpNotifierFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Smtp {
                host,
                port,
                tls,
                username,
                password,
                from,
                to,
            } => Ok(Box::new(SmtpNotifier::new(SmtpSettings {
                host: host.clone(),
                port: *port,
                tls: *tls,
                username: username.clone(),
                password: password.clone(),
                from: from.clone(),
                to: to.clone(),
            })?)),
            _ => Err(Error::config("Invalid config for SMTP notifier")),
        }
    }
}

/// Register the SMTP notifier with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_notifier("smtp", Box::new(SmtpNotifierFactory));
}
