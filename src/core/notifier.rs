use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::{PagewatchError, Result};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a finished report to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel_name(&self) -> &'static str;

    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Plain-text mail through an authenticated STARTTLS relay
pub struct SmtpNotifier {
    config: MailConfig,
}

impl SmtpNotifier {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        let from = required(&self.config.mail_from, "mail_from / MAIL_FROM")?;
        let to = required(&self.config.mail_to, "mail_to / MAIL_TO")?;

        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .date_now();

        for recipient in parse_recipients(to)? {
            builder = builder.to(recipient);
        }

        builder
            .body(body.to_string())
            .map_err(|e| PagewatchError::Notification(format!("cannot build message: {e}")))
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = required(&self.config.smtp_host, "smtp_host / SMTP_HOST")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| PagewatchError::Notification(format!("SMTP relay {host}: {e}")))?
            .port(self.config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn channel_name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;
        let transport = self.build_transport()?;

        debug!("Sending report mail via {:?}:{}", self.config.smtp_host, self.config.smtp_port);
        transport
            .send(message)
            .await
            .map_err(|e| PagewatchError::Notification(e.to_string()))?;

        info!("📧 Report mailed to {}", self.config.mail_to.as_deref().unwrap_or_default());
        Ok(())
    }
}

/// Prints the report instead of sending it
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    fn channel_name(&self) -> &'static str {
        "stdout"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        println!("Subject: {subject}\n\n{body}");
        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PagewatchError::Notification(format!("{name} is not configured")))
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| PagewatchError::Notification(format!("invalid address {address:?}: {e}")))
}

/// Split a comma separated recipient list.
fn parse_recipients(list: &str) -> Result<Vec<Mailbox>> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(parse_mailbox)
        .collect()
}
