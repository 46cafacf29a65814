//! Core domain types and service traits for FleetWatch
//!
//! This module defines the event that flows through the pipeline and the
//! trait contracts the ingress, dispatch and notification stages use to
//! talk to each other.

use crate::notification::NotificationError;
use crate::queue::QueueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The `type` value that marks an event as an emergency.
pub const EMERGENCY_KIND: &str = "Emergency";

/// A telemetry event reported by a vehicle.
///
/// Events carry no identity of their own, so a message delivered twice is
/// processed twice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Event {
    /// Category label, e.g. "Emergency" or "Position"
    #[serde(rename = "type")]
    pub kind: String,
    /// Plate of the reporting vehicle
    #[serde(rename = "vehicle_plate")]
    pub vehicle_identifier: String,
    /// Free-form status carried through to the notification
    pub status: String,
}

impl Event {
    /// Decodes an event from its JSON wire form.
    ///
    /// Only a JSON object is an event. Arrays, scalars and `null` are
    /// rejected even though serde's derived impl would accept a sequence.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        serde_json::from_value(serde_json::Value::Object(fields))
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Exact, case-sensitive match against [`EMERGENCY_KIND`].
    pub fn is_emergency(&self) -> bool {
        self.kind == EMERGENCY_KIND
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Publishes serialized events to the durable queue
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hands a serialized event to the broker client.
    ///
    /// # Returns
    /// * `Ok(())` once the client library accepted the message
    /// * `Err` if the channel rejected the publish
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;
}

/// Sends an alert for a single emergency event
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Formats and delivers a notification for `event`.
    ///
    /// Delivery is best effort: callers log the error and move on.
    async fn notify(&self, event: &Event) -> Result<(), NotificationError>;
}
