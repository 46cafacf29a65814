//! Durable queue access over AMQP.
//!
//! The connector opens one broker session at startup; the session is then
//! shared by the ingress path (publishing) and the dispatch path (consuming).

pub mod connector;
pub mod session;

use futures::stream::BoxStream;
use thiserror::Error;

pub use connector::{retry_fixed, QueueConnector, RetryPolicy};
pub use session::{AmqpPublisher, QueueSession};

/// Content type attached to every published event.
pub const EVENT_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("could not connect to message broker after {attempts} attempts: {last}")]
    ConnectExhausted { attempts: u32, last: String },

    #[error("queue channel closed: {0}")]
    Closed(String),
}

/// A message taken off the queue. The broker has already considered it
/// delivered by the time the dispatcher sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub payload: Vec<u8>,
    pub content_type: Option<String>,
}

impl QueueMessage {
    /// Wraps a JSON payload the way the publisher would label it.
    pub fn json(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            content_type: Some(EVENT_CONTENT_TYPE.to_string()),
        }
    }
}

impl From<lapin::message::Delivery> for QueueMessage {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self {
            content_type: delivery
                .properties
                .content_type()
                .as_ref()
                .map(|ct| ct.as_str().to_owned()),
            payload: delivery.data,
        }
    }
}

/// The stream of consumed messages fed to the dispatcher.
pub type DeliveryStream = BoxStream<'static, Result<QueueMessage, QueueError>>;
