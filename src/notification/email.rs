//! Email alerts over SMTP.

use crate::config::{SmtpConfig, SmtpTls};
use crate::core::{AlertNotifier, Event};
use crate::formatting::format_emergency;
use crate::notification::NotificationError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Sends a fully-formed message. Implemented by the real SMTP client and by
/// test doubles.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, message: Message) -> Result<(), String>;
}

/// `EmailTransport` backed by `lettre`'s async SMTP client.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Builds the client. No connection is made until the first send.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let tls = match config.tls {
            SmtpTls::None => Tls::None,
            SmtpTls::Opportunistic => Tls::Opportunistic(Self::tls_parameters(&config.host)?),
            SmtpTls::Required => Tls::Required(Self::tls_parameters(&config.host)?),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls);

        if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.to_string(), password));
        }

        Ok(Self {
            inner: builder.build(),
        })
    }

    fn tls_parameters(host: &str) -> Result<TlsParameters, NotificationError> {
        TlsParameters::new(host.to_string())
            .map_err(|e| NotificationError::Transport(e.to_string()))
    }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn send_email(&self, message: Message) -> Result<(), String> {
        self.inner
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Emails one fixed recipient for every emergency event.
pub struct EmailNotifier {
    transport: Arc<dyn EmailTransport>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Creates a notifier that sends through the configured SMTP server.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let transport = Arc::new(SmtpTransport::from_config(config)?);
        Self::with_transport(transport, &config.from, &config.recipient)
    }

    /// Creates a notifier that sends through `transport`.
    pub fn with_transport(
        transport: Arc<dyn EmailTransport>,
        from: &str,
        to: &str,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            transport,
            from: parse_mailbox(from)?,
            to: parse_mailbox(to)?,
        })
    }

    fn build_message(&self, event: &Event) -> Result<Message, NotificationError> {
        let text = format_emergency(event);
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(text.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(text.body)
            .map_err(|e| NotificationError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl AlertNotifier for EmailNotifier {
    #[instrument(skip_all, fields(vehicle = %event.vehicle_identifier))]
    async fn notify(&self, event: &Event) -> Result<(), NotificationError> {
        let message = self.build_message(event)?;

        let start = Instant::now();
        let result = self.transport.send_email(message).await;
        metrics::histogram!("notification_duration_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                info!("Emergency email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to send emergency email");
                Err(NotificationError::Send(e))
            }
        }
    }
}
