use async_trait::async_trait;
use fleetwatch::core::EventPublisher;
use fleetwatch::queue::{DeliveryStream, QueueError, QueueMessage};
use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// An in-process stand-in for the broker queue.
///
/// Everything published is recorded and then handed to the consumer side in
/// publish order.
#[derive(Clone)]
pub struct MemoryQueue {
    tx: async_channel::Sender<Vec<u8>>,
    rx: async_channel::Receiver<Vec<u8>>,
    published: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            tx,
            rx,
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The stream the dispatcher consumes from.
    pub fn deliveries(&self) -> DeliveryStream {
        self.rx
            .clone()
            .map(|payload| Ok(QueueMessage::json(payload)))
            .boxed()
    }

    pub fn published(&self) -> Vec<Vec<u8>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        self.published.lock().unwrap().push(payload.clone());
        self.tx
            .send(payload)
            .await
            .map_err(|_| QueueError::Closed("memory queue receiver dropped".to_string()))
    }
}
