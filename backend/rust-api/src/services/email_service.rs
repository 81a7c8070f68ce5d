use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::EmailSettings;

/// Fully rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    pub from: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build email message: {0}")]
    Build(String),
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
    #[error("SMTP delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("email sending is disabled (EMAIL_SEND_DISABLED)")]
    Disabled,
}

/// Outbound mail collaborator. Each call is a single delivery attempt.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

pub struct SmtpEmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    timeout: Duration,
}

impl SmtpEmailTransport {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        Ok(Self {
            mailer: Self::build_mailer(settings)?,
            timeout: settings.send_timeout(),
        })
    }

    pub fn sending_disabled() -> bool {
        std::env::var("EMAIL_SEND_DISABLED")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn build_mailer(settings: &EmailSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
                .context("Invalid SMTP server for TLS")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
        }
        .port(settings.port);

        let builder = if settings.login.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                settings.login.clone(),
                settings.password.clone(),
            ))
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if Self::sending_disabled() {
            return Err(EmailError::Disabled);
        }

        let message = build_message(email)?;

        match tokio::time::timeout(self.timeout, self.mailer.send(message)).await {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(err)) => Err(EmailError::Smtp(err.to_string())),
            Err(_) => Err(EmailError::Timeout(self.timeout)),
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse::<Mailbox>()
        .map_err(|err| EmailError::InvalidAddress {
            address: address.to_string(),
            reason: err.to_string(),
        })
}

/// Builds a `multipart/alternative` message carrying both bodies.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, EmailError> {
    if email.recipients.is_empty() {
        return Err(EmailError::Build("no recipients".to_string()));
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from)?)
        .subject(email.subject.as_str());

    for recipient in &email.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            email.plain_body.clone(),
            email.html_body.clone(),
        ))
        .map_err(|err| EmailError::Build(err.to_string()))
}
