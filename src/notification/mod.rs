//! Delivery of emergency alerts.
//!
//! Alerts are best effort. A failed send is logged and reported to the
//! caller, which does not retry, requeue or fall back to another channel.
pub mod email;

use thiserror::Error;

pub use crate::core::AlertNotifier;
pub use email::{EmailNotifier, EmailTransport, SmtpTransport};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport configuration error: {0}")]
    Transport(String),

    #[error("failed to send email: {0}")]
    Send(String),
}
