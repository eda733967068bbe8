//! Outgoing email.
//!
//! Reminders and password resets go through the [`Mailer`] trait. With an
//! SMTP relay configured, [`SmtpMailer`] delivers through `lettre`;
//! otherwise [`LogMailer`] writes each message to the log.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::{Error, Result};

/// A plain-text message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Email {
    /// Daily reminder addressed to `name`.
    #[must_use]
    pub fn daily_reminder(to: impl Into<String>, name: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Your Daily Health Reminder".to_string(),
            body: format!(
                "Hi {name},\n\nThis is your daily reminder to log your health data in the Health Tracker app!"
            ),
        }
    }

    /// Password reset link.
    #[must_use]
    pub fn password_reset(to: impl Into<String>, username: &str, link: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Password reset on Health Tracker".to_string(),
            body: format!(
                "You're receiving this email because you requested a password reset for your account.\n\n\
                 Please go to the following page and choose a new password:\n\n{link}\n\n\
                 Your username, in case you've forgotten: {username}\n\n\
                 The link expires in one hour."
            ),
        }
    }
}

/// Delivery channel for [`Email`]s.
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Deliver one message.
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!("Email to {}: {}", email.to, email.subject);
        debug!("Email body:\n{}", email.body);
        Ok(())
    }
}

/// Delivers through an SMTP relay with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Build a relay transport for `host`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mail` if the sender address or relay host is invalid.
    pub fn new(host: &str, config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| Error::Mail(format!("invalid sender address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| Error::Mail(format!("invalid SMTP relay {host}: {e}")))?
            .port(config.smtp_port);
        if let (Some(user), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| Error::Mail(format!("invalid recipient {}: {e}", email.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| Error::Mail(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Mail(e.to_string()))?;
        debug!("Sent email to {}", email.to);
        Ok(())
    }
}

/// Pick the mailer the configuration asks for.
///
/// # Errors
///
/// Returns an error if the SMTP settings are invalid.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref() {
        Some(host) => {
            info!("Delivering mail through SMTP relay {}", host);
            Ok(Arc::new(SmtpMailer::new(host, config)?))
        }
        None => {
            info!("No SMTP relay configured, emails will be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
