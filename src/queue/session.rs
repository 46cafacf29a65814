//! The live broker session shared by the publishing and consuming paths.

use crate::core::EventPublisher;
use crate::queue::{DeliveryStream, QueueError, QueueMessage, EVENT_CONTENT_TYPE};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection,
};
use tracing::{debug, info, warn};

/// AMQP delivery mode 2: the broker writes the message to disk.
const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// An open connection plus the channel declared against the event queue.
///
/// A `lapin::Channel` is safe to use from several tasks, so the publisher
/// and the consumer share this one channel.
pub struct QueueSession {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl QueueSession {
    pub(crate) fn new(connection: Connection, channel: Channel, queue_name: String) -> Self {
        Self {
            connection,
            channel,
            queue_name,
        }
    }

    /// Returns a publisher bound to this session's channel.
    pub fn publisher(&self) -> AmqpPublisher {
        AmqpPublisher {
            channel: self.channel.clone(),
            queue_name: self.queue_name.clone(),
        }
    }

    /// Starts consuming the event queue with automatic acknowledgment.
    ///
    /// Every message counts as delivered the moment it reaches this process,
    /// before it is processed. A crash mid-processing loses the message
    /// rather than redelivering it.
    pub async fn consume(&self) -> Result<DeliveryStream, QueueError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(queue = %self.queue_name, "Consuming queue with automatic acknowledgment");

        Ok(consumer
            .map(|delivery| delivery.map(QueueMessage::from).map_err(QueueError::from))
            .boxed())
    }

    /// Closes the channel and then the connection.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "shutdown").await {
            warn!(error = %e, "Failed to close broker channel");
        }
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "shutdown").await {
            warn!(error = %e, "Failed to close broker connection");
        }
        debug!("Broker session closed");
    }
}

impl std::fmt::Debug for QueueSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSession")
            .field("queue_name", &self.queue_name)
            .finish_non_exhaustive()
    }
}

/// Publishes events to the default exchange, routed by queue name.
#[derive(Clone)]
pub struct AmqpPublisher {
    channel: Channel,
    queue_name: String,
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        if !self.channel.status().connected() {
            return Err(QueueError::Closed(format!(
                "cannot publish to {}",
                self.queue_name
            )));
        }

        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(EVENT_CONTENT_TYPE.into());

        // Publisher confirms are not awaited. Ok means the client accepted the
        // frame, not that the broker stored it.
        let _confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?;
        Ok(())
    }
}
