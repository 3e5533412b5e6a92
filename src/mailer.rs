use crate::config::{Config, SmtpConfig};
use crate::errors::ApiError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;

/// Outbound email transport. Only the registration flow talks to this;
/// the storage and credential code never does.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError>;
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let from: Mailbox = cfg.from.parse()?;
        let transport = SmtpTransport::relay(&cfg.host)?
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self { transport, from })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        let to: Mailbox = to.parse().map_err(|_| {
            ApiError::BadRequest("invalid email address".into())
        })?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| {
                log::error!("failed to build email: {e:?}");
                ApiError::Internal
            })?;
        self.transport.send(&message).map_err(|e| {
            log::error!("email delivery failed: {e:?}");
            ApiError::Internal
        })?;
        Ok(())
    }
}

/// Fallback when no SMTP block is configured: logs the message so local
/// setups can still complete the verification flow.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        log::info!("email (not sent, no smtp configured) to={to} subject={subject:?} body={body:?}");
        Ok(())
    }
}

pub fn from_config(cfg: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    match &cfg.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp)?)),
        None => {
            log::warn!("no [smtp] config block, verification codes will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
