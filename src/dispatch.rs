//! The dispatch worker pool.
//!
//! One consumption loop pulls messages off the queue. For each message it
//! acquires a worker slot, waiting while all slots are taken, and then spawns
//! an independent task that decodes, classifies and, for emergencies, sends
//! an alert. The slot travels with the task and is released when the task
//! ends, whatever the outcome.
//!
//! Messages are auto-acknowledged on receipt, so anything that goes wrong
//! after that point (bad payload, failed email, crash) loses the message.

use crate::core::{AlertNotifier, Event};
use crate::internal_metrics::Metrics;
use crate::queue::{QueueError, QueueMessage};
use futures::{FutureExt, Stream, StreamExt};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, instrument, warn};

/// What happened to a single consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Emergency event, alert sent.
    Notified,
    /// Emergency event, alert delivery failed.
    NotificationFailed,
    /// Any other event kind; nothing to do.
    Discarded,
    /// The payload was not a decodable event and was dropped.
    Malformed,
}

/// Decodes and classifies one message, notifying for emergencies.
pub async fn process_message(
    message: &QueueMessage,
    notifier: &dyn AlertNotifier,
    metrics: &Metrics,
) -> DispatchOutcome {
    let event = match Event::from_json(&message.payload) {
        Ok(event) => event,
        Err(e) => {
            metrics.messages_malformed_total.increment(1);
            error!(error = %e, "Dropping undecodable queue message");
            return DispatchOutcome::Malformed;
        }
    };

    if !event.is_emergency() {
        return DispatchOutcome::Discarded;
    }

    metrics.emergencies_detected_total.increment(1);
    info!(vehicle = %event.vehicle_identifier, "Emergency event received");

    match notifier.notify(&event).await {
        Ok(()) => {
            metrics.increment_notification("sent");
            DispatchOutcome::Notified
        }
        Err(e) => {
            metrics.increment_notification("failed");
            warn!(vehicle = %event.vehicle_identifier, error = %e, "Emergency alert was not delivered");
            DispatchOutcome::NotificationFailed
        }
    }
}

/// Bounded-concurrency consumer of the event queue.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn AlertNotifier>,
    slots: Arc<Semaphore>,
    concurrency_limit: usize,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        concurrency_limit: NonZeroUsize,
        notifier: Arc<dyn AlertNotifier>,
        metrics: Metrics,
    ) -> Self {
        let concurrency_limit = concurrency_limit.get();
        Self {
            notifier,
            slots: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            metrics,
        }
    }

    /// Number of units of work currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.concurrency_limit - self.slots.available_permits()
    }

    /// Consumes `deliveries` until the stream ends or shutdown is signalled.
    ///
    /// Shutdown stops the loop only; units already spawned are left to finish
    /// or to be abandoned with the runtime.
    #[instrument(skip_all, fields(concurrency_limit = self.concurrency_limit))]
    pub async fn run<S>(&self, mut deliveries: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: Stream<Item = Result<QueueMessage, QueueError>> + Unpin + Send,
    {
        info!("Dispatcher started");
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("Dispatcher received shutdown signal.");
                    break;
                }
                next = deliveries.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!(error = %e, "Error receiving from queue");
                    continue;
                }
                None => {
                    warn!("Queue consumer stream ended, dispatcher stopping.");
                    break;
                }
            };
            self.metrics.messages_consumed_total.increment(1);

            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("Dispatcher received shutdown signal while waiting for a worker slot.");
                    break;
                }
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!("Worker slot pool closed, dispatcher stopping.");
                        break;
                    }
                },
            };

            self.metrics.set_worker_slots_in_use(self.in_flight());
            let notifier = self.notifier.clone();
            let metrics = self.metrics.clone();
            let slots = self.slots.clone();
            let limit = self.concurrency_limit;
            tokio::spawn(async move {
                match AssertUnwindSafe(process_message(&message, notifier.as_ref(), &metrics))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => debug!(?outcome, "Message processed"),
                    Err(_) => error!("Message processing panicked, message dropped"),
                }
                drop(permit);
                metrics.set_worker_slots_in_use(limit - slots.available_permits());
            });
        }
        info!("Dispatcher finished.");
    }
}
